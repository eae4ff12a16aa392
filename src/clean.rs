//! Removal of cancellations, returns and incomplete order lines

use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::data::{INVOICE, LINE_TOTAL, QUANTITY, REQUIRED_FIELDS, UNIT_PRICE};

/// Marker carried by the invoice id of a cancelled order
pub const CANCELLATION_MARKER: &str = "C";

/// How the cancellation marker is matched against invoice ids
///
/// `Contains` flags any invoice with an uppercase `C` anywhere in it, which
/// is what the historical scoring did. `Prefix` only flags invoices that
/// start with `C`, the documented business rule. Both are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationRule {
    #[default]
    Contains,
    Prefix,
}

impl CancellationRule {
    /// Boolean expression flagging cancelled invoices; null stays null
    pub fn flags(self, invoice: Expr) -> Expr {
        let marker = lit(CANCELLATION_MARKER);
        match self {
            CancellationRule::Contains => invoice.str().contains_literal(marker),
            CancellationRule::Prefix => invoice.str().starts_with(marker),
        }
    }
}

impl fmt::Display for CancellationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationRule::Contains => write!(f, "contains"),
            CancellationRule::Prefix => write!(f, "prefix"),
        }
    }
}

impl FromStr for CancellationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contains" => Ok(CancellationRule::Contains),
            "prefix" => Ok(CancellationRule::Prefix),
            other => Err(format!(
                "unknown cancellation rule '{}', expected 'contains' or 'prefix'",
                other
            )),
        }
    }
}

/// Row counts for each cleaning rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub cancelled: usize,
    pub non_positive_quantity: usize,
    pub incomplete: usize,
    pub retained: usize,
}

impl CleaningReport {
    pub fn discarded(&self) -> usize {
        self.input_rows - self.retained
    }
}

/// Completed sales plus the counts of what was dropped
#[derive(Debug, Clone)]
pub struct CleanedTransactions {
    /// Surviving rows with a `line_total` column
    pub frame: DataFrame,
    pub report: CleaningReport,
}

/// Every required field present, and no NaN price
///
/// Description and country are not required: a sale with no product text
/// or country is still a sale. This is looser than dropping any row with a
/// null anywhere.
fn complete() -> Expr {
    REQUIRED_FIELDS
        .iter()
        .map(|name| col(name).is_not_null())
        .fold(col(UNIT_PRICE).is_not_nan(), |acc, present| acc.and(present))
}

/// Keep only completed sales
///
/// Rules, in order: drop cancelled invoices, drop non-positive quantities,
/// drop rows missing any required field. A row is counted against the first
/// rule it fails; a quantity that is missing or unparseable counts as
/// incomplete, not as non-positive.
///
/// # Arguments
/// * `transactions` - Normalised order lines (see [`crate::data::normalize_transactions`])
/// * `rule` - How cancelled invoices are recognised
///
/// # Returns
/// * Surviving rows with `line_total` attached, and a [`CleaningReport`]
pub fn clean_transactions(transactions: LazyFrame, rule: CancellationRule) -> crate::Result<CleanedTransactions> {
    let cancelled = rule.flags(col(INVOICE)).fill_null(lit(false));
    let non_positive = cancelled
        .clone()
        .not()
        .and(col(QUANTITY).lt_eq(lit(0.0)).fill_null(lit(false)));
    let retained = cancelled
        .clone()
        .not()
        .and(col(QUANTITY).gt(lit(0.0)))
        .and(complete())
        .fill_null(lit(false));

    let counts = transactions
        .clone()
        .select([
            len().cast(DataType::Int64).alias("input_rows"),
            cancelled.cast(DataType::Int64).sum().alias("cancelled"),
            non_positive.cast(DataType::Int64).sum().alias("non_positive_quantity"),
            retained.clone().cast(DataType::Int64).sum().alias("retained"),
        ])
        .collect()?;

    let count = |name: &str| -> crate::Result<usize> {
        Ok(counts.column(name)?.i64()?.get(0).unwrap_or(0) as usize)
    };
    let input_rows = count("input_rows")?;
    let cancelled = count("cancelled")?;
    let non_positive_quantity = count("non_positive_quantity")?;
    let retained_rows = count("retained")?;
    let report = CleaningReport {
        input_rows,
        cancelled,
        non_positive_quantity,
        incomplete: input_rows - cancelled - non_positive_quantity - retained_rows,
        retained: retained_rows,
    };

    let frame = transactions
        .filter(retained)
        .with_columns([(col(QUANTITY) * col(UNIT_PRICE)).alias(LINE_TOTAL)])
        .collect()?;

    debug!(
        input = report.input_rows,
        cancelled = report.cancelled,
        non_positive_quantity = report.non_positive_quantity,
        incomplete = report.incomplete,
        retained = report.retained,
        rule = %rule,
        "cleaned transactions"
    );
    if report.retained * 2 < report.input_rows {
        warn!(
            discarded = report.discarded(),
            input = report.input_rows,
            "more than half of the order lines were discarded"
        );
    }

    Ok(CleanedTransactions { frame, report })
}
