use bulkstage::config::BulkConfig;
use bulkstage::error::ErrorKind;
use bulkstage::orchestrator::OperationContext;
use bulkstage::test_utils::sample::ORDER_TYPE;

use crate::support::{boxed_orders, harness, orders_table, recording_sink, statement_position};

#[tokio::test]
async fn insert_writes_one_row_per_entity() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let entities = boxed_orders(3);

    orchestrator.insert(&conn, &ctx, &entities).await.unwrap();

    let rows = conn.rows(&orders_table()).unwrap();
    assert_eq!(rows.len(), 3);
    // No staging lifecycle on a plain insert.
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
}

#[test]
fn insert_blocking_matches_the_async_form() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let entities = boxed_orders(2);

    orchestrator.insert_blocking(&conn, &ctx, &entities).unwrap();

    assert_eq!(conn.rows(&orders_table()).unwrap().len(), 2);
}

#[tokio::test]
async fn progress_fractions_are_bounded_and_final() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        notify_after: 1,
        ..BulkConfig::default()
    };
    let (sink, seen) = recording_sink();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config).with_progress(sink);

    orchestrator
        .insert(&conn, &ctx, &boxed_orders(3))
        .await
        .unwrap();

    let fractions = seen.lock().unwrap().clone();
    assert_eq!(fractions.first(), Some(&0.3333));
    assert_eq!(fractions.last(), Some(&1.0));
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn empty_input_reports_no_progress() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig::default();
    let (sink, seen) = recording_sink();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config).with_progress(sink);

    orchestrator.insert(&conn, &ctx, &[]).await.unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}

#[tokio::test]
async fn column_mismatch_on_missing_table_triggers_the_schema_probe() {
    let (conn, writer, orchestrator) = harness();
    writer.fail_with(ErrorKind::TransferColumnMismatch);

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .insert(&conn, &ctx, &boxed_orders(1))
        .await
        .unwrap_err();

    // The probe improves diagnostics but never changes the outcome.
    assert_eq!(err.kind(), ErrorKind::TransferColumnMismatch);
    assert!(statement_position(&conn, "INTO dbo.orders_schema_probe").is_some());
    assert!(statement_position(&conn, "DROP TABLE dbo.orders_schema_probe").is_some());
}

#[tokio::test]
async fn probe_failures_never_replace_the_transfer_error() {
    let (conn, writer, orchestrator) = harness();
    writer.fail_with(ErrorKind::TransferColumnMismatch);
    conn.fail_statements_containing("_schema_probe");

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .insert(&conn, &ctx, &boxed_orders(1))
        .await
        .unwrap_err();

    // The probe statements ran and failed; the mismatch still propagates.
    assert_eq!(err.kind(), ErrorKind::TransferColumnMismatch);
    assert!(statement_position(&conn, "INTO dbo.orders_schema_probe").is_some());
}

#[tokio::test]
async fn column_mismatch_on_existing_table_skips_the_probe() {
    let (conn, writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    writer.fail_with(ErrorKind::TransferColumnMismatch);

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .insert(&conn, &ctx, &boxed_orders(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransferColumnMismatch);
    assert!(statement_position(&conn, "_schema_probe").is_none());
}

#[tokio::test]
async fn other_transfer_failures_propagate_without_probing() {
    let (conn, writer, orchestrator) = harness();
    writer.fail_with(ErrorKind::TransferFailed);

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .insert(&conn, &ctx, &boxed_orders(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert!(statement_position(&conn, "_schema_probe").is_none());
}

#[tokio::test]
async fn invalid_config_fails_before_any_statement() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        batch_size: 0,
        ..BulkConfig::default()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .insert(&conn, &ctx, &boxed_orders(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    assert!(conn.executed().is_empty());
}
