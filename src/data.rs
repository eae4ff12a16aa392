//! Transaction loading and column normalisation using Polars

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

use crate::error::CltvError;

/// Normalised column names used by every pipeline stage
pub const INVOICE: &str = "invoice";
pub const STOCK_CODE: &str = "stock_code";
pub const DESCRIPTION: &str = "description";
pub const QUANTITY: &str = "quantity";
pub const INVOICE_DATE: &str = "invoice_date";
pub const UNIT_PRICE: &str = "unit_price";
pub const CUSTOMER_ID: &str = "customer_id";
pub const COUNTRY: &str = "country";
/// quantity × unit_price, attached by the cleaner
pub const LINE_TOTAL: &str = "line_total";

/// Fields a sale must carry to survive cleaning
pub const REQUIRED_FIELDS: [&str; 6] = [INVOICE, STOCK_CODE, QUANTITY, INVOICE_DATE, UNIT_PRICE, CUSTOMER_ID];

const INVOICE_COLUMNS: &[&str] = &["Invoice", "InvoiceNo"];
const STOCK_CODE_COLUMNS: &[&str] = &["StockCode"];
const DESCRIPTION_COLUMNS: &[&str] = &["Description"];
const QUANTITY_COLUMNS: &[&str] = &["Quantity"];
const INVOICE_DATE_COLUMNS: &[&str] = &["InvoiceDate"];
const PRICE_COLUMNS: &[&str] = &["Price", "UnitPrice"];
const CUSTOMER_COLUMNS: &[&str] = &["Customer ID", "CustomerID"];
const COUNTRY_COLUMNS: &[&str] = &["Country"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

/// First and last invoice timestamps seen in a set of transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpan {
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
}

impl DatasetSpan {
    /// Span of the parseable dates; `None` when no date parses
    pub fn from_dates<'a, I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut timestamps = dates.into_iter().filter_map(parse_invoice_timestamp);
        let first = timestamps.next()?;
        let (first, last) = timestamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        Some(Self { first, last })
    }

    /// Span of the `invoice_date` column of a normalised table
    pub fn from_frame(df: &DataFrame) -> crate::Result<Option<Self>> {
        let dates = df.column(INVOICE_DATE)?.str()?;
        Ok(Self::from_dates(dates.into_iter().flatten()))
    }
}

/// Parse an invoice timestamp in ISO-8601 or `m/d/Y H:M` layout
pub fn parse_invoice_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Load a headered CSV file of order lines
///
/// Every column is read as text; typing happens in [`normalize_transactions`]
/// so that mixed columns (e.g. numeric invoices next to `C`-prefixed ones)
/// never trip schema inference.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * The raw table, one row per order line
pub fn load_transactions(file_path: &str) -> crate::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()?;

    debug!(rows = df.height(), columns = df.width(), file = file_path, "loaded transaction table");
    Ok(df)
}

/// Which column of the table feeds each transaction field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub invoice: String,
    pub stock_code: String,
    pub description: Option<String>,
    pub quantity: String,
    pub invoice_date: String,
    pub unit_price: String,
    pub customer_id: String,
    pub country: Option<String>,
}

impl ColumnMapping {
    /// Resolve field columns by name, accepting both Online Retail layouts
    ///
    /// Fails with [`CltvError::MalformedInput`] naming every required field
    /// that has no matching column.
    pub fn resolve(df: &DataFrame) -> crate::Result<Self> {
        let names = df.get_column_names();
        let find = |candidates: &[&str]| {
            candidates
                .iter()
                .find(|candidate| names.iter().any(|name| name == *candidate))
                .map(|name| name.to_string())
        };

        let mut missing = Vec::new();
        let mut require = |candidates: &[&str]| {
            let found = find(candidates);
            if found.is_none() {
                missing.push(candidates.join("|"));
            }
            found.unwrap_or_default()
        };

        let invoice = require(INVOICE_COLUMNS);
        let stock_code = require(STOCK_CODE_COLUMNS);
        let quantity = require(QUANTITY_COLUMNS);
        let invoice_date = require(INVOICE_DATE_COLUMNS);
        let unit_price = require(PRICE_COLUMNS);
        let customer_id = require(CUSTOMER_COLUMNS);

        if !missing.is_empty() {
            return Err(CltvError::MalformedInput { missing });
        }

        Ok(Self {
            invoice,
            stock_code,
            description: find(DESCRIPTION_COLUMNS),
            quantity,
            invoice_date,
            unit_price,
            customer_id,
            country: find(COUNTRY_COLUMNS),
        })
    }
}

/// Rename and type the input columns for the pipeline
///
/// Text fields become `String`, quantity and unit price become `Float64`.
/// Cells that cannot be cast turn into nulls, the same as empty cells, and
/// absent optional columns become all-null.
pub fn normalize_transactions(df: &DataFrame) -> crate::Result<LazyFrame> {
    let columns = ColumnMapping::resolve(df)?;
    let text = |name: &str| col(name).cast(DataType::String);
    let optional_text = |name: Option<&str>| match name {
        Some(name) => text(name),
        None => lit(NULL).cast(DataType::String),
    };

    Ok(df.clone().lazy().select([
        text(columns.invoice.as_str()).alias(INVOICE),
        text(columns.stock_code.as_str()).alias(STOCK_CODE),
        optional_text(columns.description.as_deref()).alias(DESCRIPTION),
        col(columns.quantity.as_str()).cast(DataType::Float64).alias(QUANTITY),
        text(columns.invoice_date.as_str()).alias(INVOICE_DATE),
        col(columns.unit_price.as_str()).cast(DataType::Float64).alias(UNIT_PRICE),
        text(columns.customer_id.as_str()).alias(CUSTOMER_ID),
        optional_text(columns.country.as_deref()).alias(COUNTRY),
    ]))
}
