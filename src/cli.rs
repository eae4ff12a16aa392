//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::clean::CancellationRule;
use crate::metrics::validate_profit_margin_rate;
use crate::pipeline::PipelineOptions;

/// Customer Lifetime Value segmentation for retail transaction data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file of order lines
    #[arg(short, long, default_value = "online_retail_II.csv")]
    pub input: String,

    /// Output path for the per-customer CLTV table (CSV)
    #[arg(short, long, default_value = "cltv_c.csv")]
    pub output: String,

    /// Fraction of revenue counted as profit
    #[arg(short, long, default_value = "0.10")]
    pub profit_margin: f64,

    /// How cancelled invoices are recognised: "contains" flags any invoice
    /// with a C in it, "prefix" only those starting with C
    #[arg(long, default_value = "contains")]
    pub cancellation_rule: CancellationRule,

    /// Number of top customers to print
    #[arg(short = 'n', long, default_value = "5")]
    pub top: usize,

    /// Optional PNG path for segment charts
    #[arg(long)]
    pub plot: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Check argument values before any data is read
    pub fn validate(&self) -> crate::Result<()> {
        validate_profit_margin_rate(self.profit_margin)?;
        if let Some(ref plot) = self.plot {
            if !plot.ends_with(".png") {
                return Err(crate::CltvError::InvalidArgument(format!(
                    "plot path must end in .png, got '{}'",
                    plot
                )));
            }
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            profit_margin_rate: self.profit_margin,
            cancellation_rule: self.cancellation_rule,
        }
    }
}
