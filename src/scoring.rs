//! Quartile scoring and segmentation of the aggregated RFM table

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::data::CustomerId;
use crate::error::{Metric, Result, RfmError};
use crate::quantile::{qcut, quantile_edges, rank_first};
use crate::rfm::{CustomerRfm, RfmTable};
use crate::segment::{Scores, Segment};

/// Number of score levels per metric
pub const SCORE_LEVELS: usize = 4;

/// A customer with scores and segment attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCustomer {
    #[serde(flatten)]
    pub rfm: CustomerRfm,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(rename = "RFM_Score")]
    pub rfm_score: String,
    #[serde(rename = "Segment")]
    pub segment: Segment,
}

impl ScoredCustomer {
    pub fn customer_id(&self) -> &CustomerId {
        &self.rfm.customer_id
    }
}

/// Scored rows in the same order as the aggregated table
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTable {
    pub anchor_date: NaiveDateTime,
    pub rows: Vec<ScoredCustomer>,
}

impl ScoredTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredCustomer> {
        self.rows.iter()
    }

    pub fn get(&self, customer_id: &CustomerId) -> Option<&ScoredCustomer> {
        self.rows.iter().find(|row| row.customer_id() == customer_id)
    }
}

/// Score every customer in quartiles and assign a segment
///
/// * Recency: lowest quarter of days-since-purchase scores 4, highest scores 1
/// * Frequency: ranked first (ties in table order) so repeated counts still
///   spread over four bins; scores 1 to 4
/// * Monetary: scores 1 to 4
///
/// # Arguments
/// * `table` - Aggregated RFM values
///
/// # Returns
/// * `ScoredTable` with one row per input row, or
///   `EmptyPopulation` / `InsufficientData` when quartiles cannot be formed
pub fn score_customers(table: &RfmTable) -> Result<ScoredTable> {
    let anchor_date = match table.anchor_date {
        Some(date) if !table.is_empty() => date,
        _ => return Err(RfmError::EmptyPopulation),
    };

    let recency: Vec<f64> = table.rows.iter().map(|row| row.recency as f64).collect();
    let frequency: Vec<f64> = table.rows.iter().map(|row| row.frequency as f64).collect();
    let monetary: Vec<f64> = table
        .rows
        .iter()
        .map(|row| {
            if row.monetary.is_finite() {
                Ok(row.monetary)
            } else {
                Err(RfmError::column(
                    "Monetary",
                    format!("customer {} has a non-finite total", row.customer_id),
                ))
            }
        })
        .collect::<Result<_>>()?;

    let recency_bins = quartile_bins(Metric::Recency, &recency)?;
    let frequency_bins = quartile_bins(Metric::Frequency, &rank_first(&frequency))?;
    let monetary_bins = quartile_bins(Metric::Monetary, &monetary)?;

    let rows: Vec<ScoredCustomer> = table
        .rows
        .iter()
        .enumerate()
        .map(|(i, rfm)| {
            let scores = Scores::new(
                (SCORE_LEVELS - recency_bins[i]) as u8,
                (frequency_bins[i] + 1) as u8,
                (monetary_bins[i] + 1) as u8,
            );
            ScoredCustomer {
                rfm: rfm.clone(),
                scores,
                rfm_score: scores.rfm_score(),
                segment: Segment::classify(scores),
            }
        })
        .collect();

    info!("Scored {} customers", rows.len());

    Ok(ScoredTable { anchor_date, rows })
}

fn quartile_bins(metric: Metric, values: &[f64]) -> Result<Vec<usize>> {
    debug!(%metric, edges = ?quantile_edges(values, SCORE_LEVELS), "quartile boundaries");
    qcut(values, SCORE_LEVELS).ok_or(RfmError::InsufficientData {
        metric,
        population: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn rfm_row(id: &str, recency: i64, frequency: usize, monetary: f64) -> CustomerRfm {
        CustomerRfm {
            customer_id: CustomerId::new(id),
            recency,
            frequency,
            monetary,
        }
    }

    fn table(rows: Vec<CustomerRfm>) -> RfmTable {
        RfmTable {
            anchor_date: chrono::NaiveDate::from_ymd_opt(2011, 12, 9)
                .unwrap()
                .and_hms_opt(12, 0, 0),
            rows,
        }
    }

    fn eight_customers() -> RfmTable {
        table(vec![
            rfm_row("01", 1, 20, 900.0),
            rfm_row("02", 3, 15, 800.0),
            rfm_row("03", 10, 12, 120.0),
            rfm_row("04", 30, 9, 700.0),
            rfm_row("05", 60, 1, 60.0),
            rfm_row("06", 90, 2, 40.0),
            rfm_row("07", 200, 8, 20.0),
            rfm_row("08", 300, 10, 10.0),
        ])
    }

    #[test]
    fn test_score_customers() {
        let scored = score_customers(&eight_customers()).unwrap();
        assert_eq!(scored.len(), 8);

        let scores: Vec<String> = scored.iter().map(|row| row.rfm_score.clone()).collect();
        assert_eq!(
            scores,
            vec!["444", "444", "333", "323", "212", "212", "121", "131"]
        );

        let segments: Vec<Segment> = scored.iter().map(|row| row.segment).collect();
        assert_eq!(
            segments,
            vec![
                Segment::Champions,
                Segment::Champions,
                Segment::Champions,
                Segment::RecentCustomers,
                Segment::Others,
                Segment::Others,
                Segment::Others,
                Segment::AtRisk,
            ]
        );
    }

    #[test]
    fn test_recency_extremes_take_extreme_scores() {
        let scored = score_customers(&eight_customers()).unwrap();
        let most_recent = scored.iter().min_by_key(|row| row.rfm.recency).unwrap();
        let least_recent = scored.iter().max_by_key(|row| row.rfm.recency).unwrap();
        assert_eq!(most_recent.scores.r, 4);
        assert_eq!(least_recent.scores.r, 1);
    }

    #[test]
    fn test_tied_frequencies_are_spread_by_table_order() {
        let scored = score_customers(&table(vec![
            rfm_row("A", 1, 1, 10.0),
            rfm_row("B", 2, 1, 20.0),
            rfm_row("C", 3, 1, 30.0),
            rfm_row("D", 4, 1, 40.0),
        ]))
        .unwrap();

        let f: Vec<u8> = scored.iter().map(|row| row.scores.f).collect();
        assert_eq!(f, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_population() {
        let err = score_customers(&RfmTable::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyPopulation);
    }

    #[test]
    fn test_identical_rows_are_insufficient() {
        let err = score_customers(&table(vec![
            rfm_row("A", 5, 2, 50.0),
            rfm_row("B", 5, 2, 50.0),
            rfm_row("C", 5, 2, 50.0),
        ]))
        .unwrap_err();

        match err {
            RfmError::InsufficientData { metric, population } => {
                assert_eq!(metric, Metric::Recency);
                assert_eq!(population, 3);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_monetary_is_reported() {
        let err = score_customers(&table(vec![
            rfm_row("A", 1, 1, 50.0),
            rfm_row("B", 2, 2, 50.0),
            rfm_row("C", 3, 3, 50.0),
            rfm_row("D", 4, 4, 50.0),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            RfmError::InsufficientData {
                metric: Metric::Monetary,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_monetary_is_scored_not_clamped() {
        let scored = score_customers(&table(vec![
            rfm_row("A", 1, 1, -25.0),
            rfm_row("B", 2, 2, 0.0),
            rfm_row("C", 3, 3, 25.0),
            rfm_row("D", 4, 4, 50.0),
        ]))
        .unwrap();

        let a = scored.get(&CustomerId::new("A")).unwrap();
        assert_eq!(a.rfm.monetary, -25.0);
        assert_eq!(a.scores.m, 1);
    }

    #[test]
    fn test_scored_row_serializes_with_column_names() {
        let scored = score_customers(&eight_customers()).unwrap();
        let value = serde_json::to_value(&scored.rows[0]).unwrap();
        assert_eq!(value["CustomerID"], "01");
        assert_eq!(value["R"], 4);
        assert_eq!(value["RFM_Score"], "444");
        assert_eq!(value["Segment"], "Champions");
    }
}
