//! CltvForge: Customer Lifetime Value segmentation for retail transaction data
//!
//! Order lines are cleaned, aggregated per customer, scored with a fixed
//! CLTV formula and split into four quantile segments (D, C, B, A).

pub mod aggregate;
pub mod clean;
pub mod cli;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use aggregate::{aggregate_by_customer, CustomerAggregate};
pub use clean::{clean_transactions, CancellationRule, CleanedTransactions, CleaningReport};
pub use cli::Args;
pub use data::{load_transactions, normalize_transactions, DatasetSpan};
pub use error::CltvError;
pub use metrics::{derive_metrics, CustomerMetrics, MetricTable, PopulationStats, DEFAULT_PROFIT_MARGIN_RATE};
pub use pipeline::{compute_cltv_segments, compute_cltv_segments_with, CltvTable, PipelineOptions, SegmentedCustomer};
pub use segment::{assign_segments, summarize_segments, MetricSummary, QuantileEdges, Segment, SegmentSummary};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, CltvError>;
