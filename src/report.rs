//! Dashboard payload: summary table, chart list and chart inputs

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::quantile::quantile_sorted;
use crate::scoring::{ScoredCustomer, ScoredTable};
use crate::segment::Segment;

/// Rows shown in the dashboard table
pub const SUMMARY_ROWS: usize = 10;

pub const SUMMARY_COLUMNS: [&str; 6] = [
    "CustomerID",
    "Recency",
    "Frequency",
    "Monetary",
    "RFM_Score",
    "Segment",
];

pub const SCORED_COLUMNS: [&str; 9] = [
    "CustomerID",
    "Recency",
    "Frequency",
    "Monetary",
    "R",
    "F",
    "M",
    "RFM_Score",
    "Segment",
];

/// Bins of the recency histogram
pub const HISTOGRAM_BINS: usize = 30;

/// Points on which the recency density curve is evaluated
const DENSITY_POINTS: usize = 200;

/// The five dashboard charts, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    RecencyDistribution,
    FrequencyVsMonetary,
    MonetaryBoxplot,
    RecencyVsFrequency,
    SegmentDistribution,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::RecencyDistribution,
        ChartKind::FrequencyVsMonetary,
        ChartKind::MonetaryBoxplot,
        ChartKind::RecencyVsFrequency,
        ChartKind::SegmentDistribution,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ChartKind::RecencyDistribution => "Recency Distribution",
            ChartKind::FrequencyVsMonetary => "Frequency vs Monetary",
            ChartKind::MonetaryBoxplot => "Monetary Boxplot",
            ChartKind::RecencyVsFrequency => "Recency vs Frequency",
            ChartKind::SegmentDistribution => "Customer Segment Distribution",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ChartKind::RecencyDistribution => "recency_distribution.png",
            ChartKind::FrequencyVsMonetary => "freq_vs_monetary.png",
            ChartKind::MonetaryBoxplot => "monetary_boxplot.png",
            ChartKind::RecencyVsFrequency => "recency_vs_frequency.png",
            ChartKind::SegmentDistribution => "segment_distribution.png",
        }
    }
}

/// (title, image file) pair handed to the page template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartSpec {
    pub title: &'static str,
    pub file_name: &'static str,
}

impl From<ChartKind> for ChartSpec {
    fn from(kind: ChartKind) -> Self {
        ChartSpec {
            title: kind.title(),
            file_name: kind.file_name(),
        }
    }
}

/// Everything the dashboard page renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub table_columns: Vec<&'static str>,
    pub table_data: Vec<Map<String, Value>>,
    pub charts: Vec<ChartSpec>,
}

/// Build the dashboard payload from the first [`SUMMARY_ROWS`] scored rows
pub fn summarize(table: &ScoredTable) -> Dashboard {
    Dashboard {
        table_columns: SUMMARY_COLUMNS.to_vec(),
        table_data: table.iter().take(SUMMARY_ROWS).map(summary_row).collect(),
        charts: ChartKind::ALL.into_iter().map(ChartSpec::from).collect(),
    }
}

fn summary_row(row: &ScoredCustomer) -> Map<String, Value> {
    let values = [
        Value::from(row.customer_id().as_str()),
        Value::from(row.rfm.recency),
        Value::from(row.rfm.frequency),
        Value::from(row.rfm.monetary),
        Value::from(row.rfm_score.as_str()),
        Value::from(row.segment.label()),
    ];

    SUMMARY_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .zip(values)
        .collect()
}

/// Equal-width histogram with an optional density curve scaled to counts
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub start: f64,
    pub bin_width: f64,
    pub counts: Vec<usize>,
    /// `(x, expected count)` points of a Gaussian kernel density estimate
    pub density: Option<Vec<(f64, f64)>>,
}

impl Histogram {
    pub fn end(&self) -> f64 {
        self.start + self.bin_width * self.counts.len() as f64
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Recency distribution over [`HISTOGRAM_BINS`] bins
pub fn recency_histogram(table: &ScoredTable) -> Histogram {
    let values: Vec<f64> = table.iter().map(|row| row.rfm.recency as f64).collect();
    histogram(&values, HISTOGRAM_BINS)
}

/// Bin `values` into `bins` equal-width bins spanning their range.
///
/// The last bin is closed on both sides. A zero-width range is widened by
/// half a unit each way.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let (mut low, mut high) = min_max(values).unwrap_or((0.0, 1.0));
    if low == high {
        low -= 0.5;
        high += 0.5;
    }

    let bin_width = (high - low) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &value in values {
        let index = (((value - low) / bin_width).floor() as usize).min(bins - 1);
        counts[index] += 1;
    }

    let density = kernel_density(values, low, high).map(|points| {
        let scale = values.len() as f64 * bin_width;
        points
            .into_iter()
            .map(|(x, density)| (x, density * scale))
            .collect()
    });

    Histogram {
        start: low,
        bin_width,
        counts,
        density,
    }
}

/// Gaussian KDE with Scott's bandwidth, evaluated on `[low, high]`.
///
/// `None` for fewer than two values or zero spread.
fn kernel_density(values: &[f64], low: f64, high: f64) -> Option<Vec<(f64, f64)>> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 || !std_dev.is_finite() {
        return None;
    }

    let bandwidth = std_dev * (n as f64).powf(-0.2);
    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    let step = (high - low) / (DENSITY_POINTS - 1) as f64;

    let points = (0..DENSITY_POINTS)
        .map(|i| {
            let x = low + step * i as f64;
            let sum: f64 = values
                .iter()
                .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
                .sum();
            (x, sum * norm)
        })
        .collect();
    Some(points)
}

/// `(Frequency, Monetary)` for every customer
pub fn frequency_vs_monetary(table: &ScoredTable) -> Vec<(f64, f64)> {
    table
        .iter()
        .map(|row| (row.rfm.frequency as f64, row.rfm.monetary))
        .collect()
}

/// `(Recency, Frequency)` for every customer
pub fn recency_vs_frequency(table: &ScoredTable) -> Vec<(f64, f64)> {
    table
        .iter()
        .map(|row| (row.rfm.recency as f64, row.rfm.frequency as f64))
        .collect()
}

/// Five-number summary with Tukey whiskers
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest value within 1.5 IQR below Q1
    pub lower_whisker: f64,
    /// Largest value within 1.5 IQR above Q3
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

/// Box statistics of Monetary
pub fn monetary_box(table: &ScoredTable) -> Option<BoxStats> {
    let values: Vec<f64> = table.iter().map(|row| row.rfm.monetary).collect();
    box_stats(&values)
}

pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile_sorted(&sorted, 0.25);
    let median = quantile_sorted(&sorted, 0.5);
    let q3 = quantile_sorted(&sorted, 0.75);
    let reach = 1.5 * (q3 - q1);
    let (low_fence, high_fence) = (q1 - reach, q3 + reach);

    let inside = sorted.iter().copied().filter(|v| (low_fence..=high_fence).contains(v));
    let (lower_whisker, upper_whisker) = min_max(&inside.collect::<Vec<_>>()).unwrap_or((q1, q3));
    let outliers = sorted
        .iter()
        .copied()
        .filter(|v| !(low_fence..=high_fence).contains(v))
        .collect();

    Some(BoxStats {
        q1,
        median,
        q3,
        lower_whisker,
        upper_whisker,
        outliers,
    })
}

/// Customers per segment, most common first; absent segments are left out
pub fn segment_counts(table: &ScoredTable) -> Vec<(Segment, usize)> {
    let mut counts: Vec<(Segment, usize)> = Segment::ALL
        .iter()
        .map(|&segment| {
            let count = table.iter().filter(|row| row.segment == segment).count();
            (segment, count)
        })
        .filter(|&(_, count)| count > 0)
        .collect();
    // Stable sort keeps Segment::ALL order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(low, high), &v| (low.min(v), high.max(v))),
    )
}

/// Convert the full scored table into a DataFrame with [`SCORED_COLUMNS`]
pub fn to_dataframe(table: &ScoredTable) -> Result<DataFrame> {
    let rows = &table.rows;
    let customer_ids: Vec<&str> = rows.iter().map(|row| row.customer_id().as_str()).collect();
    let recency: Vec<i64> = rows.iter().map(|row| row.rfm.recency).collect();
    let frequency: Vec<i64> = rows.iter().map(|row| row.rfm.frequency as i64).collect();
    let monetary: Vec<f64> = rows.iter().map(|row| row.rfm.monetary).collect();
    let r: Vec<i32> = rows.iter().map(|row| i32::from(row.scores.r)).collect();
    let f: Vec<i32> = rows.iter().map(|row| i32::from(row.scores.f)).collect();
    let m: Vec<i32> = rows.iter().map(|row| i32::from(row.scores.m)).collect();
    let rfm_scores: Vec<&str> = rows.iter().map(|row| row.rfm_score.as_str()).collect();
    let segments: Vec<&str> = rows.iter().map(|row| row.segment.label()).collect();

    let df = DataFrame::new(vec![
        Series::new(SCORED_COLUMNS[0], customer_ids),
        Series::new(SCORED_COLUMNS[1], recency),
        Series::new(SCORED_COLUMNS[2], frequency),
        Series::new(SCORED_COLUMNS[3], monetary),
        Series::new(SCORED_COLUMNS[4], r),
        Series::new(SCORED_COLUMNS[5], f),
        Series::new(SCORED_COLUMNS[6], m),
        Series::new(SCORED_COLUMNS[7], rfm_scores),
        Series::new(SCORED_COLUMNS[8], segments),
    ])?;
    Ok(df)
}

/// Write the full scored table as CSV
pub fn write_csv(table: &ScoredTable, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut df = to_dataframe(table)?;
    let mut file = File::create(output_path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("Wrote {} scored customers to {}", df.height(), output_path.display());
    Ok(())
}
