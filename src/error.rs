//! Error taxonomy for the CLTV pipeline

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that abort a pipeline run
///
/// None of these are recoverable for the current run: the pipeline never
/// substitutes a default churn rate or score to keep going.
#[derive(Error, Debug)]
pub enum CltvError {
    #[error("input table is missing required column(s): {}", missing.join(", "))]
    MalformedInput { missing: Vec<String> },

    #[error("no customers remain after cleaning")]
    EmptyPopulation,

    #[error("churn rate is zero: all {customers} customers are repeat buyers, cltv is undefined")]
    DegenerateChurn { customers: usize },

    #[error("cannot split cltv into 4 quantile segments: {reason}")]
    Segmentation { reason: String },

    #[error("profit margin rate must be finite and non-negative, got {0}")]
    InvalidProfitMarginRate(f64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CltvError {
    pub(crate) fn segmentation(reason: impl Into<String>) -> Self {
        CltvError::Segmentation {
            reason: reason.into(),
        }
    }
}
