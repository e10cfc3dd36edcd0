//! Aggregation of invoice lines into per-customer Recency, Frequency and Monetary values

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::data::{
    line_total_expr, transactions_frame, CustomerId, Transaction, CUSTOMER_ID, INVOICE_DATE,
    INVOICE_NO, LINE_TOTAL,
};
use crate::error::{Result, RfmError};

const LAST_PURCHASE: &str = "LastPurchaseDate";
const RECENCY: &str = "Recency";
const FREQUENCY: &str = "Frequency";
const MONETARY: &str = "Monetary";
const MICROS_PER_DAY: i64 = 86_400_000_000;

/// RFM values of a single customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRfm {
    #[serde(rename = "CustomerID")]
    pub customer_id: CustomerId,
    /// Whole days between the anchor date and the customer's last purchase
    #[serde(rename = "Recency")]
    pub recency: i64,
    /// Distinct invoices
    #[serde(rename = "Frequency")]
    pub frequency: usize,
    /// Net spend; returns are subtracted
    #[serde(rename = "Monetary")]
    pub monetary: f64,
}

/// One row per identified customer, ordered by CustomerID
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RfmTable {
    /// Latest InvoiceDate among identified customers, `None` when there are none
    pub anchor_date: Option<NaiveDateTime>,
    pub rows: Vec<CustomerRfm>,
}

impl RfmTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, customer_id: &CustomerId) -> Option<&CustomerRfm> {
        self.rows
            .binary_search_by(|row| row.customer_id.cmp(customer_id))
            .ok()
            .map(|index| &self.rows[index])
    }
}

/// Compute RFM values for every identified customer
///
/// Anonymous lines (no CustomerID) are dropped before anything else, so they
/// neither create a customer nor move the anchor date.
///
/// # Arguments
/// * `transactions` - Typed invoice lines, in input order
///
/// # Returns
/// * `RfmTable`, empty when no line carries a CustomerID
pub fn compute_rfm(transactions: &[Transaction]) -> Result<RfmTable> {
    // First pass: identified lines and the anchor every recency is measured from
    let identified = transactions_frame(transactions)?
        .lazy()
        .filter(col(CUSTOMER_ID).is_not_null())
        .collect()?;

    debug!(
        "Dropped {} anonymous lines out of {}",
        transactions.len() - identified.height(),
        transactions.len()
    );

    let anchor_micros = match identified.column(INVOICE_DATE)?.i64()?.max() {
        Some(micros) => micros,
        None => return Ok(RfmTable::default()),
    };
    let anchor_date = DateTime::from_timestamp_micros(anchor_micros)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| RfmError::column(INVOICE_DATE, "latest purchase is out of range"))?;
    debug!(%anchor_date, "recency anchor");

    // Second pass: per-customer totals
    let rfm_df = identified
        .lazy()
        .with_columns([line_total_expr()])
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_DATE).max().alias(LAST_PURCHASE),
            col(INVOICE_NO).n_unique().cast(DataType::Int64).alias(FREQUENCY),
            // Summed in value order so the total does not depend on row order
            col(LINE_TOTAL)
                .sort(SortOptions::default())
                .sum()
                .alias(MONETARY),
        ])
        .with_columns([
            // Whole days, truncated
            ((lit(anchor_micros) - col(LAST_PURCHASE)) / lit(MICROS_PER_DAY))
                .cast(DataType::Int64)
                .alias(RECENCY),
        ])
        .select([
            col(CUSTOMER_ID),
            col(RECENCY),
            col(FREQUENCY),
            col(MONETARY),
        ])
        .collect()?;

    let customer_ids = rfm_df.column(CUSTOMER_ID)?.str()?;
    let recencies = rfm_df.column(RECENCY)?.i64()?;
    let frequencies = rfm_df.column(FREQUENCY)?.i64()?;
    let monetaries = rfm_df.column(MONETARY)?.f64()?;

    let mut rows = customer_ids
        .into_iter()
        .zip(recencies)
        .zip(frequencies)
        .zip(monetaries)
        .map(|(((customer_id, recency), frequency), monetary)| {
            match (customer_id, recency, frequency, monetary) {
                (Some(customer_id), Some(recency), Some(frequency), Some(monetary)) => {
                    Ok(CustomerRfm {
                        customer_id: CustomerId::new(customer_id),
                        recency,
                        frequency: frequency as usize,
                        monetary,
                    })
                }
                _ => Err(RfmError::column(CUSTOMER_ID, "aggregation produced a null value")),
            }
        })
        .collect::<Result<Vec<CustomerRfm>>>()?;

    // group_by makes no ordering promise
    rows.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));

    info!("Aggregated {} customers", rows.len());

    Ok(RfmTable {
        anchor_date: Some(anchor_date),
        rows,
    })
}
