//! Integration tests for CltvForge

use cltvforge::{
    aggregate_by_customer, clean_transactions, compute_cltv_segments, derive_metrics, load_transactions,
    normalize_transactions, CancellationRule, CltvError, Segment, DEFAULT_PROFIT_MARGIN_RATE,
};
use polars::prelude::*;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country";

fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

/// Create a test CSV file with five customers and a few lines to be cleaned away
fn create_test_csv() -> NamedTempFile {
    write_csv(&[
        // Customer 17850 - two invoices, one with two lines
        "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850,United Kingdom",
        "536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26:00,3.39,17850,United Kingdom",
        "536366,22633,HAND WARMER UNION JACK,6,2011-11-01 08:28:00,1.85,17850,United Kingdom",
        // Customer 13047 - single purchase plus a return
        "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34:00,2.75,13047,United Kingdom",
        "536372,22457,NATURAL SLATE HEART CHALKBOARD,-3,2010-12-02 09:00:00,100.0,13047,United Kingdom",
        // Customer 12345 - one invoice, two lines
        "536368,22752,SET 7 BABUSHKA NESTING BOXES,2,2011-12-05 10:15:00,7.65,12345,France",
        "536368,21730,GLASS STAR FROSTED T-LIGHT HOLDER,12,2011-12-05 10:15:00,1.25,12345,France",
        // Customer 98765 - old low value
        "536369,22457,NATURAL SLATE HEART CHALKBOARD,4,2010-01-15 09:00:00,3.25,98765,United Kingdom",
        // Customer 14688 - two invoices and a cancellation
        "536370,22728,ALARM CLOCK BAKELIKE PINK,24,2010-12-01 08:45:00,0.85,14688,United Kingdom",
        "536371,22960,JAM MAKING SET WITH JARS,10,2010-12-03 11:00:00,4.95,14688,United Kingdom",
        "C536379,D,Discount,-1,2010-12-03 11:30:00,27.50,14688,United Kingdom",
        // Anonymous sale
        "536373,21754,HOME BUILDING BLOCK WORD,3,2010-12-01 09:02:00,5.95,,United Kingdom",
    ])
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    assert_eq!(table.len(), 5);
    assert_eq!(table.cleaning.input_rows, 12);
    assert_eq!(table.cleaning.cancelled, 1);
    assert_eq!(table.cleaning.non_positive_quantity, 1);
    assert_eq!(table.cleaning.incomplete, 1);
    assert_eq!(table.cleaning.retained, 9);

    assert_eq!(table.population.repeat_customers, 2);
    assert_close(table.population.churn_rate, 0.6);

    let segment_of = |id: &str| {
        table
            .customers
            .iter()
            .find(|c| c.metrics.customer_id == id)
            .map(|c| c.segment)
            .unwrap()
    };
    assert_eq!(segment_of("14688"), Segment::A);
    assert_eq!(segment_of("17850"), Segment::B);
    assert_eq!(segment_of("12345"), Segment::C);
    assert_eq!(segment_of("13047"), Segment::D);
    assert_eq!(segment_of("98765"), Segment::D);
}

#[test]
fn test_distinct_invoices_and_excluded_rows() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    let metrics_of = |id: &str| {
        table
            .customers
            .iter()
            .find(|c| c.metrics.customer_id == id)
            .map(|c| c.metrics.clone())
            .unwrap()
    };

    // Three lines over two invoices
    let repeat = metrics_of("17850");
    assert_eq!(repeat.total_transaction, 2);
    assert_eq!(repeat.total_unit, 18.0);

    // The cancelled invoice never reaches the aggregate
    let cancelled = metrics_of("14688");
    assert_eq!(cancelled.total_transaction, 2);
    assert_eq!(cancelled.total_unit, 34.0);
    assert_close(cancelled.total_price, 69.9);

    // The -3 return is dropped even though customer and price are valid
    let returned = metrics_of("13047");
    assert_eq!(returned.total_unit, 8.0);
    assert_close(returned.total_price, 22.0);
}

#[test]
fn test_metric_identities_hold_for_every_row() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();
    let churn_rate = 1.0 - table.population.repeat_customers as f64 / table.len() as f64;

    for customer in &table.customers {
        let m = &customer.metrics;
        assert_close(m.average_order_value * m.total_transaction as f64, m.total_price);
        assert_close(m.purchase_frequency, m.total_transaction as f64 / table.len() as f64);
        assert_close(m.cltv, (m.customer_value / churn_rate) * m.profit_margin);
    }
}

#[test]
fn test_segments_monotonic_in_cltv() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    for a in &table.customers {
        for b in &table.customers {
            if a.metrics.cltv < b.metrics.cltv {
                assert!(a.segment.rank() <= b.segment.rank());
            }
        }
    }
}

#[test]
fn test_pipeline_is_idempotent() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    let first = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();
    let second = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_two_customer_scores() {
    let test_file = write_csv(&[
        "1001,A1,ITEM,1,2010-12-01 08:00:00,60.0,X,United Kingdom",
        "1002,A1,ITEM,1,2010-12-02 08:00:00,40.0,X,United Kingdom",
        "1003,A1,ITEM,2,2010-12-03 08:00:00,25.0,Y,United Kingdom",
    ]);
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    let cleaned = clean_transactions(normalize_transactions(&df).unwrap(), CancellationRule::Contains).unwrap();
    let aggregates = aggregate_by_customer(&cleaned.frame).unwrap();
    let table = derive_metrics(&aggregates, 0.10).unwrap();

    assert_close(table.population.repeat_rate, 0.5);
    assert_close(table.population.churn_rate, 0.5);
    assert_eq!(table.rows[0].customer_id, "X");
    assert_close(table.rows[0].cltv, 1000.0);
    assert_eq!(table.rows[1].customer_id, "Y");
    assert_close(table.rows[1].cltv, 250.0);

    // Two customers cannot fill four segments
    assert!(matches!(
        compute_cltv_segments(&df, 0.10),
        Err(CltvError::Segmentation { .. })
    ));
}

#[test]
fn test_fractional_and_unparseable_quantities() {
    let test_file = write_csv(&[
        "2001,A1,ITEM,2.7,2010-12-01 08:00:00,10.0,A,United Kingdom",
        "2002,A1,ITEM,0.5,2010-12-01 08:00:00,10.0,B,United Kingdom",
        "2003,A1,ITEM,abc,2010-12-01 08:00:00,10.0,C,United Kingdom",
        "2004,A1,ITEM,3,2010-12-01 08:00:00,10.0,C,United Kingdom",
        "2005,A1,ITEM,4,2010-12-01 08:00:00,10.0,D,United Kingdom",
        "2006,A1,ITEM,5,2010-12-02 08:00:00,10.0,D,United Kingdom",
    ]);
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    assert_eq!(table.cleaning.retained, 5);
    assert_eq!(table.cleaning.incomplete, 1);
    assert_eq!(table.cleaning.non_positive_quantity, 0);

    let metrics_of = |id: &str| {
        table
            .customers
            .iter()
            .find(|c| c.metrics.customer_id == id)
            .map(|c| c.metrics.clone())
            .unwrap()
    };
    let a = metrics_of("A");
    assert_close(a.total_unit, 2.7);
    assert_close(a.total_price, 27.0);

    let b = metrics_of("B");
    assert_close(b.total_unit, 0.5);
    assert_close(b.total_price, 5.0);

    // Only the parsed line survives for C
    let c = metrics_of("C");
    assert_eq!(c.total_transaction, 1);
    assert_close(c.total_unit, 3.0);
}

#[test]
fn test_segment_summaries_cover_headline_columns() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    let summaries = table.segment_summaries().unwrap();
    assert_eq!(summaries.iter().map(|s| s.count).sum::<usize>(), 5);

    let d = summaries[Segment::D.rank()];
    assert_eq!(d.count, 2);
    assert_close(d.total_transaction.sum, 2.0);
    assert_close(d.total_unit.sum, 12.0);
    assert_close(d.total_price.sum, 22.0 + 13.0);
    assert_close(d.total_price.mean, 17.5);
    assert_close(d.profit_margin.sum, 3.5);

    let revenue: f64 = summaries.iter().map(|s| s.total_price.sum).sum();
    let expected: f64 = table.customers.iter().map(|c| c.metrics.total_price).sum();
    assert_close(revenue, expected);
}

#[test]
fn test_all_repeat_customers_fail() {
    let test_file = write_csv(&[
        "1001,A1,ITEM,1,2010-12-01 08:00:00,10.0,A,United Kingdom",
        "1002,A1,ITEM,1,2010-12-02 08:00:00,10.0,A,United Kingdom",
        "1003,A1,ITEM,1,2010-12-01 08:00:00,20.0,B,United Kingdom",
        "1004,A1,ITEM,1,2010-12-02 08:00:00,20.0,B,United Kingdom",
        "1005,A1,ITEM,1,2010-12-01 08:00:00,30.0,C,United Kingdom",
        "1006,A1,ITEM,1,2010-12-02 08:00:00,30.0,C,United Kingdom",
        "1007,A1,ITEM,1,2010-12-01 08:00:00,40.0,D,United Kingdom",
        "1008,A1,ITEM,1,2010-12-02 08:00:00,40.0,D,United Kingdom",
    ]);
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    match compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE) {
        Err(CltvError::DegenerateChurn { customers }) => assert_eq!(customers, 4),
        other => panic!("expected DegenerateChurn, got {:?}", other),
    }
}

#[test]
fn test_tied_scores_fail_segmentation() {
    let test_file = write_csv(&[
        "1001,A1,ITEM,1,2010-12-01 08:00:00,10.0,A,United Kingdom",
        "1002,A1,ITEM,1,2010-12-01 08:00:00,10.0,B,United Kingdom",
        "1003,A1,ITEM,1,2010-12-01 08:00:00,10.0,C,United Kingdom",
        "1004,A1,ITEM,1,2010-12-01 08:00:00,10.0,D,United Kingdom",
        "1005,A1,ITEM,1,2010-12-02 08:00:00,10.0,D,United Kingdom",
    ]);
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();

    let err = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap_err();
    assert!(matches!(err, CltvError::Segmentation { .. }));
    assert!(err.to_string().contains("4 quantile segments"));
}

#[test]
fn test_missing_columns_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Invoice,StockCode,Quantity,InvoiceDate,Customer ID").unwrap();
    writeln!(file, "1001,A1,1,2010-12-01 08:00:00,A").unwrap();

    let df = load_transactions(file.path().to_str().unwrap()).unwrap();
    match compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE) {
        Err(CltvError::MalformedInput { missing }) => assert_eq!(missing, vec!["Price|UnitPrice"]),
        other => panic!("expected MalformedInput, got {:?}", other),
    }
}

#[test]
fn test_in_memory_frame_with_nulls() {
    let df = df!(
        "Invoice" => &["1", "2", "3", "4", "5", "C6"],
        "StockCode" => &["A1", "A1", "A1", "A1", "A1", "A1"],
        "Quantity" => &[1i64, 2, 3, 4, 5, 6],
        "InvoiceDate" => &["2010-12-01 08:00:00"; 6],
        "Price" => &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0],
        "Customer ID" => &[Some("A"), Some("B"), Some("C"), Some("D"), None, Some("A")]
    )
    .unwrap();

    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.cleaning.incomplete, 1);
    assert_eq!(table.cleaning.cancelled, 1);

    let segments: Vec<Segment> = table.customers.iter().map(|c| c.segment).collect();
    assert_eq!(segments, vec![Segment::D, Segment::C, Segment::B, Segment::A]);
}

#[test]
fn test_write_csv_output() {
    let test_file = create_test_csv();
    let df = load_transactions(test_file.path().to_str().unwrap()).unwrap();
    let table = compute_cltv_segments(&df, DEFAULT_PROFIT_MARGIN_RATE).unwrap();

    let dir = tempdir().unwrap();
    let output_path = dir.path().join("cltv_c.csv");
    table.write_csv(output_path.to_str().unwrap()).unwrap();

    let written = std::fs::read_to_string(&output_path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("customer_id,total_transaction,total_unit,total_price,average_order_value,purchase_frequency,profit_margin,customer_value,cltv,segment")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().any(|row| row.starts_with("14688,2,34.0,") && row.ends_with(",A")));
}
