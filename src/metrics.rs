//! Ratio metrics and the CLTV score

use tracing::debug;

use crate::aggregate::CustomerAggregate;
use crate::error::CltvError;

/// Share of revenue counted as profit unless the caller says otherwise
pub const DEFAULT_PROFIT_MARGIN_RATE: f64 = 0.10;

/// Population-wide rates shared by every customer in a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStats {
    pub total_customers: usize,
    pub repeat_customers: usize,
    pub repeat_rate: f64,
    pub churn_rate: f64,
}

impl PopulationStats {
    /// Compute repeat and churn rates over the whole population
    ///
    /// Fails when there are no customers, or when every customer is a
    /// repeat buyer (churn rate of zero leaves cltv undefined).
    pub fn from_aggregates(aggregates: &[CustomerAggregate]) -> crate::Result<Self> {
        let total_customers = aggregates.len();
        if total_customers == 0 {
            return Err(CltvError::EmptyPopulation);
        }

        let repeat_customers = aggregates.iter().filter(|a| a.is_repeat()).count();
        let repeat_rate = repeat_customers as f64 / total_customers as f64;
        let churn_rate = 1.0 - repeat_rate;

        if churn_rate == 0.0 {
            return Err(CltvError::DegenerateChurn {
                customers: total_customers,
            });
        }

        Ok(Self {
            total_customers,
            repeat_customers,
            repeat_rate,
            churn_rate,
        })
    }
}

/// A customer's totals and derived value metrics
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: String,
    pub total_transaction: usize,
    pub total_unit: f64,
    pub total_price: f64,
    pub average_order_value: f64,
    pub purchase_frequency: f64,
    pub profit_margin: f64,
    pub customer_value: f64,
    pub cltv: f64,
}

impl CustomerMetrics {
    fn derive(aggregate: &CustomerAggregate, population: &PopulationStats, profit_margin_rate: f64) -> Self {
        let average_order_value = aggregate.total_price / aggregate.total_transaction as f64;
        let purchase_frequency = aggregate.total_transaction as f64 / population.total_customers as f64;
        let profit_margin = aggregate.total_price * profit_margin_rate;
        let customer_value = average_order_value * purchase_frequency;
        let cltv = (customer_value / population.churn_rate) * profit_margin;

        Self {
            customer_id: aggregate.customer_id.clone(),
            total_transaction: aggregate.total_transaction,
            total_unit: aggregate.total_unit,
            total_price: aggregate.total_price,
            average_order_value,
            purchase_frequency,
            profit_margin,
            customer_value,
            cltv,
        }
    }
}

/// Per-customer metrics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    pub rows: Vec<CustomerMetrics>,
    pub population: PopulationStats,
    pub profit_margin_rate: f64,
}

impl MetricTable {
    pub fn cltv_scores(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.cltv).collect()
    }
}

/// Reject margins that would poison every score
pub fn validate_profit_margin_rate(profit_margin_rate: f64) -> crate::Result<()> {
    if profit_margin_rate.is_finite() && profit_margin_rate >= 0.0 {
        Ok(())
    } else {
        Err(CltvError::InvalidProfitMarginRate(profit_margin_rate))
    }
}

/// Derive value metrics and the CLTV score for every customer
///
/// ```text
/// average_order_value = total_price / total_transaction
/// purchase_frequency  = total_transaction / total_customers
/// churn_rate          = 1 - repeat_customers / total_customers
/// profit_margin       = total_price * profit_margin_rate
/// customer_value      = average_order_value * purchase_frequency
/// cltv                = (customer_value / churn_rate) * profit_margin
/// ```
///
/// # Arguments
/// * `aggregates` - One row per customer
/// * `profit_margin_rate` - Fraction of revenue counted as profit
///
/// # Returns
/// * A [`MetricTable`] in the same row order as `aggregates`
pub fn derive_metrics(aggregates: &[CustomerAggregate], profit_margin_rate: f64) -> crate::Result<MetricTable> {
    validate_profit_margin_rate(profit_margin_rate)?;
    let population = PopulationStats::from_aggregates(aggregates)?;

    let rows = aggregates
        .iter()
        .map(|aggregate| CustomerMetrics::derive(aggregate, &population, profit_margin_rate))
        .collect();

    debug!(
        customers = population.total_customers,
        repeat_customers = population.repeat_customers,
        repeat_rate = population.repeat_rate,
        churn_rate = population.churn_rate,
        "derived customer metrics"
    );

    Ok(MetricTable {
        rows,
        population,
        profit_margin_rate,
    })
}
