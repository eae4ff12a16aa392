//! End-to-end CLTV segmentation: clean, aggregate, score, segment

use std::fs::File;

use polars::prelude::*;
use tracing::info;

use crate::aggregate::aggregate_by_customer;
use crate::clean::{clean_transactions, CancellationRule, CleaningReport};
use crate::data::{normalize_transactions, DatasetSpan, CUSTOMER_ID};
use crate::metrics::{derive_metrics, validate_profit_margin_rate, CustomerMetrics, PopulationStats, DEFAULT_PROFIT_MARGIN_RATE};
use crate::segment::{assign_segments, summarize_segments, QuantileEdges, Segment, SegmentSummary, CLTV, SEGMENT};

/// Explicit knobs for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub profit_margin_rate: f64,
    pub cancellation_rule: CancellationRule,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            profit_margin_rate: DEFAULT_PROFIT_MARGIN_RATE,
            cancellation_rule: CancellationRule::default(),
        }
    }
}

/// A customer's metrics together with the segment it landed in
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedCustomer {
    pub metrics: CustomerMetrics,
    pub segment: Segment,
}

/// Result of a run: one row per customer, ordered by customer id
#[derive(Debug, Clone, PartialEq)]
pub struct CltvTable {
    pub customers: Vec<SegmentedCustomer>,
    pub population: PopulationStats,
    pub profit_margin_rate: f64,
    pub cleaning: CleaningReport,
    pub edges: QuantileEdges,
    /// First and last invoice among the cleaned lines, when dates parse
    pub span: Option<DatasetSpan>,
}

impl CltvTable {
    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    /// Customers from highest to lowest cltv
    pub fn sorted_by_cltv_desc(&self) -> Vec<&SegmentedCustomer> {
        let mut sorted: Vec<&SegmentedCustomer> = self.customers.iter().collect();
        sorted.sort_by(|a, b| b.metrics.cltv.total_cmp(&a.metrics.cltv));
        sorted
    }

    /// Count, sums and means per segment, from D to A
    pub fn segment_summaries(&self) -> crate::Result<Vec<SegmentSummary>> {
        summarize_segments(&self.to_dataframe()?)
    }

    /// Build the output table
    ///
    /// Columns: `customer_id, total_transaction, total_unit, total_price,
    /// average_order_value, purchase_frequency, profit_margin,
    /// customer_value, cltv, segment`.
    pub fn to_dataframe(&self) -> crate::Result<DataFrame> {
        let rows = &self.customers;
        let metric = |f: fn(&CustomerMetrics) -> f64| rows.iter().map(|c| f(&c.metrics)).collect::<Vec<f64>>();

        let df = df!(
            CUSTOMER_ID => rows.iter().map(|c| c.metrics.customer_id.as_str()).collect::<Vec<_>>(),
            "total_transaction" => rows.iter().map(|c| c.metrics.total_transaction as i64).collect::<Vec<_>>(),
            "total_unit" => rows.iter().map(|c| c.metrics.total_unit).collect::<Vec<_>>(),
            "total_price" => metric(|m| m.total_price),
            "average_order_value" => metric(|m| m.average_order_value),
            "purchase_frequency" => metric(|m| m.purchase_frequency),
            "profit_margin" => metric(|m| m.profit_margin),
            "customer_value" => metric(|m| m.customer_value),
            CLTV => metric(|m| m.cltv),
            SEGMENT => rows.iter().map(|c| c.segment.label()).collect::<Vec<_>>()
        )?;
        Ok(df)
    }

    /// Write the output table as a headered CSV file
    pub fn write_csv(&self, output_path: &str) -> crate::Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(output_path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        info!(path = output_path, rows = df.height(), "wrote cltv table");
        Ok(())
    }
}

/// Compute CLTV segments from a transaction table
///
/// Runs the cleaner, aggregator, metric derivation and segmenter in
/// sequence with the default (`contains`) cancellation rule. Any failure
/// aborts the run; there is no partial output.
///
/// # Arguments
/// * `transactions` - Order lines with invoice, stock code, quantity, invoice date, price and customer columns
/// * `profit_margin_rate` - Fraction of revenue counted as profit (usually [`DEFAULT_PROFIT_MARGIN_RATE`])
///
/// # Returns
/// * One segmented row per customer
pub fn compute_cltv_segments(transactions: &DataFrame, profit_margin_rate: f64) -> crate::Result<CltvTable> {
    compute_cltv_segments_with(
        transactions,
        &PipelineOptions {
            profit_margin_rate,
            ..PipelineOptions::default()
        },
    )
}

/// [`compute_cltv_segments`] with every option explicit
pub fn compute_cltv_segments_with(transactions: &DataFrame, options: &PipelineOptions) -> crate::Result<CltvTable> {
    validate_profit_margin_rate(options.profit_margin_rate)?;

    let normalized = normalize_transactions(transactions)?;
    let cleaned = clean_transactions(normalized, options.cancellation_rule)?;
    let span = DatasetSpan::from_frame(&cleaned.frame)?;
    let aggregates = aggregate_by_customer(&cleaned.frame)?;
    let metrics = derive_metrics(&aggregates, options.profit_margin_rate)?;
    let (segments, edges) = assign_segments(&metrics.cltv_scores())?;

    let customers: Vec<SegmentedCustomer> = metrics
        .rows
        .into_iter()
        .zip(segments)
        .map(|(metrics, segment)| SegmentedCustomer { metrics, segment })
        .collect();

    info!(
        order_lines = cleaned.report.input_rows,
        retained = cleaned.report.retained,
        customers = customers.len(),
        churn_rate = metrics.population.churn_rate,
        edges = %edges,
        "computed cltv segments"
    );

    Ok(CltvTable {
        customers,
        population: metrics.population,
        profit_margin_rate: metrics.profit_margin_rate,
        cleaning: cleaned.report,
        edges,
        span,
    })
}
