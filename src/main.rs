//! CltvForge: Customer Lifetime Value segmentation CLI
//!
//! This is the main entrypoint that orchestrates data loading, scoring,
//! segmentation, reporting and CSV output.

use anyhow::{Context, Result};
use clap::Parser;
use cltvforge::{compute_cltv_segments_with, load_transactions, viz, Args};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    args.validate().context("invalid arguments")?;

    if args.verbose {
        println!("CltvForge - Customer Lifetime Value Segmentation");
        println!("================================================\n");
    }

    run_pipeline(&args)
}

/// RUST_LOG wins; otherwise info, or debug with --verbose
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();
}

/// Run the full segmentation pipeline
fn run_pipeline(args: &Args) -> Result<()> {
    println!("=== CLTV Segmentation Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load data
    if args.verbose {
        println!("Step 1: Loading transactions");
        println!("  Input file: {}", args.input);
    }

    let data_start = Instant::now();
    let transactions = load_transactions(&args.input)
        .with_context(|| format!("failed to load transactions from {}", args.input))?;
    let data_time = data_start.elapsed();

    println!("✓ Data loaded: {} order lines", transactions.height());
    if args.verbose {
        println!("  Loading time: {:.2}s", data_time.as_secs_f64());
    }

    // Step 2: Clean, aggregate, score and segment
    if args.verbose {
        println!("\nStep 2: Computing CLTV segments");
        println!("  Profit margin rate: {}", args.profit_margin);
        println!("  Cancellation rule: {}", args.cancellation_rule);
    }

    let compute_start = Instant::now();
    let table = compute_cltv_segments_with(&transactions, &args.pipeline_options())
        .context("CLTV segmentation failed")?;
    let compute_time = compute_start.elapsed();

    println!(
        "✓ Segmented {} customers ({} of {} order lines kept)",
        table.len(),
        table.cleaning.retained,
        table.cleaning.input_rows
    );
    if args.verbose {
        println!("  Cancelled: {}", table.cleaning.cancelled);
        println!("  Non-positive quantity: {}", table.cleaning.non_positive_quantity);
        println!("  Incomplete: {}", table.cleaning.incomplete);
        if let Some(span) = table.span {
            println!("  Invoices from {} to {}", span.first, span.last);
        }
        println!("  Computation time: {:.2}s", compute_time.as_secs_f64());
    }

    // Step 3: Report
    match args.plot {
        Some(ref plot) => {
            if args.verbose {
                println!("\nStep 3: Generating charts");
                println!("  Output file: {}", plot);
            }
            viz::generate_visualization_report(&table, plot).context("failed to render segment charts")?;
        }
        None => viz::print_segment_statistics(&table).context("failed to summarise segments")?,
    }
    viz::print_top_customers(&table, args.top);

    // Step 4: Persist
    table
        .write_csv(&args.output)
        .with_context(|| format!("failed to write {}", args.output))?;

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("CLTV table saved to: {}", args.output);
    if let Some(ref plot) = args.plot {
        println!("Segment charts saved to: {} and {}", plot, viz::value_chart_path(plot));
    }

    Ok(())
}
