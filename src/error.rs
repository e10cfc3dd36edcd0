//! Error types for the RFM pipeline

use std::fmt;

use polars::prelude::PolarsError;
use thiserror::Error;

/// The three metrics that are binned into quartiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Recency,
    Frequency,
    Monetary,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Recency => "Recency",
            Metric::Frequency => "Frequency",
            Metric::Monetary => "Monetary",
        };
        f.write_str(name)
    }
}

/// Coarse classification of [`RfmError`] for callers that only need to branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataFormat,
    InsufficientData,
    EmptyPopulation,
    Io,
}

/// Errors raised while loading, aggregating or scoring transactions.
///
/// Every variant aborts the invocation; the pipeline never returns a partial
/// table.
#[derive(Debug, Error)]
pub enum RfmError {
    /// Malformed or missing column or cell in the input.
    #[error("data format error{}: column {column}: {message}", row_suffix(.row))]
    DataFormat {
        /// Zero-based data row (header excluded), when the error concerns a cell
        row: Option<usize>,
        column: &'static str,
        message: String,
    },

    /// Too few customers, or too many identical values, for four distinct
    /// quantile bins.
    #[error("insufficient data to split {metric} into quartiles ({population} customers)")]
    InsufficientData { metric: Metric, population: usize },

    /// No customer left after dropping rows without a CustomerID.
    #[error("no customers remain after removing rows without a CustomerID")]
    EmptyPopulation,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {}", row),
        None => String::new(),
    }
}

impl RfmError {
    pub(crate) fn cell(row: usize, column: &'static str, message: impl Into<String>) -> Self {
        RfmError::DataFormat {
            row: Some(row),
            column,
            message: message.into(),
        }
    }

    pub(crate) fn column(column: &'static str, message: impl Into<String>) -> Self {
        RfmError::DataFormat {
            row: None,
            column,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RfmError::DataFormat { .. } => ErrorKind::DataFormat,
            RfmError::InsufficientData { .. } => ErrorKind::InsufficientData,
            RfmError::EmptyPopulation => ErrorKind::EmptyPopulation,
            RfmError::Io(_) => ErrorKind::Io,
            RfmError::Polars(err) => match err {
                PolarsError::IO { .. } => ErrorKind::Io,
                _ => ErrorKind::DataFormat,
            },
        }
    }
}

/// Result type used by the pipeline
pub type Result<T> = std::result::Result<T, RfmError>;
