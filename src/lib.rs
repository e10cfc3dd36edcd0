//! rfmseg: customer segmentation with quartile RFM scoring
//!
//! This library turns a transactional sales log into one row per customer
//! with Recency, Frequency and Monetary values, scores each metric in
//! quartiles and labels customers with a fixed set of business segments.

pub mod cli;
pub mod data;
pub mod error;
pub mod quantile;
pub mod report;
pub mod rfm;
pub mod scoring;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_transactions, CustomerId, InputEncoding, Transaction};
pub use error::{ErrorKind, Metric, Result, RfmError};
pub use report::{summarize, ChartKind, Dashboard};
pub use rfm::{compute_rfm, CustomerRfm, RfmTable};
pub use scoring::{score_customers, ScoredCustomer, ScoredTable};
pub use segment::{Scores, Segment};

/// Aggregate and score a batch of transactions
///
/// The whole batch is processed in one pass with no side effects; any error
/// aborts the run and no partial table is returned.
///
/// # Arguments
/// * `transactions` - Typed invoice lines, anonymous ones included
///
/// # Returns
/// * Scored table with one row per identified customer
pub fn run_pipeline(transactions: &[Transaction]) -> Result<ScoredTable> {
    let rfm = compute_rfm(transactions)?;
    score_customers(&rfm)
}
