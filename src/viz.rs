//! Segment reports: console tables and Plotters bar charts

use plotters::prelude::*;

use crate::error::CltvError;
use crate::pipeline::CltvTable;
use crate::segment::{Segment, SegmentSummary, SEGMENT_COUNT};

/// Bar colours from D to A
const SEGMENT_COLORS: [RGBColor; SEGMENT_COUNT] = [RED, YELLOW, BLUE, GREEN];

fn render_err<E: std::fmt::Display>(err: E) -> CltvError {
    CltvError::Render(err.to_string())
}

/// Heights of one bar per segment, D to A
pub fn segment_bars(summaries: &[SegmentSummary], value: fn(&SegmentSummary) -> f64) -> Vec<(Segment, f64)> {
    summaries.iter().map(|s| (s.segment, value(s))).collect()
}

/// Draw a bar chart with one bar per segment
fn draw_segment_bars(bars: &[(Segment, f64)], title: &str, y_desc: &str, output_path: &str) -> crate::Result<()> {
    let max_value = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max).max(1.0);

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(SEGMENT_COUNT as f64 - 0.5), 0f64..(max_value * 1.1))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(SEGMENT_COUNT)
        .x_label_formatter(&|x| {
            Segment::from_rank(x.round().max(0.0) as usize)
                .map(|s| s.to_string())
                .unwrap_or_default()
        })
        .x_desc("Segment")
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_err)?;

    for (segment, value) in bars {
        let x = segment.rank() as f64;
        let color = SEGMENT_COLORS[segment.rank()];
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x - 0.4, 0.0), (x + 0.4, *value)],
                color.filled(),
            )))
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    println!("Chart saved to: {}", output_path);

    Ok(())
}

/// Bar chart of customer counts per segment
pub fn create_segment_size_chart(table: &CltvTable, output_path: &str) -> crate::Result<()> {
    let bars = segment_bars(&table.segment_summaries()?, |s| s.count as f64);
    draw_segment_bars(&bars, "Customers per Segment", "Number of Customers", output_path)
}

/// Bar chart of summed CLTV per segment
pub fn create_segment_value_chart(table: &CltvTable, output_path: &str) -> crate::Result<()> {
    let bars = segment_bars(&table.segment_summaries()?, |s| s.cltv.sum);
    draw_segment_bars(&bars, "Total CLTV per Segment", "CLTV", output_path)
}

/// Print per-segment statistics to the console
pub fn print_segment_statistics(table: &CltvTable) -> crate::Result<()> {
    let summaries = table.segment_summaries()?;

    println!("\n=== Segment Statistics ===");
    println!("Total customers: {}", table.len());
    println!(
        "Repeat customers: {} (repeat rate {:.5}, churn rate {:.5})",
        table.population.repeat_customers, table.population.repeat_rate, table.population.churn_rate
    );
    println!("Profit margin rate: {:.2}", table.profit_margin_rate);
    println!("Quantile edges: {}", table.edges);

    println!("\n  Segment | Count | Invoices (sum/mean) |    Units (sum/mean) |     Revenue (sum/mean) |      Profit (sum/mean) |           CLTV (sum/mean)");
    println!("  --------|-------|---------------------|---------------------|------------------------|------------------------|--------------------------");
    for summary in summaries.iter().rev() {
        println!(
            "  {:>7} | {:>5} | {:>9.0} / {:>7.2} | {:>9.1} / {:>7.2} | {:>11.2} / {:>8.2} | {:>11.2} / {:>8.2} | {:>13.5} / {:>10.5}",
            summary.segment,
            summary.count,
            summary.total_transaction.sum,
            summary.total_transaction.mean,
            summary.total_unit.sum,
            summary.total_unit.mean,
            summary.total_price.sum,
            summary.total_price.mean,
            summary.profit_margin.sum,
            summary.profit_margin.mean,
            summary.cltv.sum,
            summary.cltv.mean
        );
    }

    Ok(())
}

/// Print the `n` customers with the highest CLTV
pub fn print_top_customers(table: &CltvTable, n: usize) {
    if n == 0 {
        return;
    }

    println!("\n=== Top {} Customers by CLTV ===", n);
    println!("  Customer        | Invoices |   Revenue |          CLTV | Segment");
    println!("  ----------------|----------|-----------|---------------|--------");
    for customer in table.sorted_by_cltv_desc().into_iter().take(n) {
        let m = &customer.metrics;
        println!(
            "  {:<15} | {:>8} | {:>9.2} | {:>13.5} | {}",
            m.customer_id, m.total_transaction, m.total_price, m.cltv, customer.segment
        );
    }
}

/// Write both charts and print the statistics
///
/// `base_output_path` receives the size chart; the value chart goes next
/// to it with a `_value` suffix.
pub fn generate_visualization_report(table: &CltvTable, base_output_path: &str) -> crate::Result<()> {
    create_segment_size_chart(table, base_output_path)?;

    let value_chart_path = value_chart_path(base_output_path);
    create_segment_value_chart(table, &value_chart_path)?;

    print_segment_statistics(table)
}

/// Path of the companion CLTV chart for a size chart path
pub fn value_chart_path(base_output_path: &str) -> String {
    match base_output_path.strip_suffix(".png") {
        Some(stem) => format!("{}_value.png", stem),
        None => format!("{}_value.png", base_output_path),
    }
}
