//! Per-customer reduction of cleaned order lines

use polars::prelude::*;
use tracing::debug;

use crate::data::{CUSTOMER_ID, INVOICE, LINE_TOTAL, QUANTITY};

/// Totals for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub customer_id: String,
    /// Number of distinct invoices
    pub total_transaction: usize,
    /// Sum of quantities
    pub total_unit: f64,
    /// Sum of line totals
    pub total_price: f64,
}

impl CustomerAggregate {
    pub fn is_repeat(&self) -> bool {
        self.total_transaction > 1
    }
}

/// Group cleaned order lines by exact customer id
///
/// Lines sharing an invoice count as one transaction. Rows come back in
/// ascending customer id order.
///
/// # Arguments
/// * `cleaned` - Output of [`crate::clean::clean_transactions`], with `line_total`
///
/// # Returns
/// * One [`CustomerAggregate`] per distinct customer id
pub fn aggregate_by_customer(cleaned: &DataFrame) -> crate::Result<Vec<CustomerAggregate>> {
    let grouped = cleaned
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE).n_unique().cast(DataType::Int64).alias("total_transaction"),
            col(QUANTITY).sum().alias("total_unit"),
            col(LINE_TOTAL).sum().alias("total_price"),
        ])
        .sort([CUSTOMER_ID], Default::default())
        .collect()?;

    let customer_ids = grouped.column(CUSTOMER_ID)?.str()?;
    let transactions = grouped.column("total_transaction")?.i64()?;
    let units = grouped.column("total_unit")?.f64()?;
    let prices = grouped.column("total_price")?.f64()?;

    let aggregates: Vec<CustomerAggregate> = customer_ids
        .into_no_null_iter()
        .zip(transactions.into_no_null_iter())
        .zip(units.into_no_null_iter())
        .zip(prices.into_no_null_iter())
        .map(|(((customer_id, total_transaction), total_unit), total_price)| CustomerAggregate {
            customer_id: customer_id.to_string(),
            total_transaction: total_transaction as usize,
            total_unit,
            total_price,
        })
        .collect();

    debug!(
        lines = cleaned.height(),
        customers = aggregates.len(),
        "aggregated transactions by customer"
    );
    Ok(aggregates)
}
