use std::sync::Arc;

use bulkstage::config::BulkConfig;
use bulkstage::error::ErrorKind;
use bulkstage::orchestrator::OperationContext;
use bulkstage::progress::ProgressSink;
use bulkstage::signal::create_cancellation;
use bulkstage::test_utils::sample::ORDER_TYPE;
use bulkstage::types::{OperationKind, Value};
use chrono::{TimeZone, Utc};

use crate::support::{boxed_orders, harness, orders_table, scalar, statement_position};

fn explicit_drop_config() -> BulkConfig {
    // The fake engine has no session-scoped temp tables, so cleanup tests
    // exercise the explicit drop path.
    BulkConfig {
        use_temp_storage: false,
        ..BulkConfig::default()
    }
}

#[tokio::test]
async fn upsert_stages_rows_and_merges_them_into_the_target() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(2);

    orchestrator
        .merge(&conn, &ctx, OperationKind::InsertOrUpdate, &mut entities)
        .await
        .unwrap();

    assert_eq!(conn.rows(&orders_table()).unwrap().len(), 2);
    // The staging table is gone; only the target remains.
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);

    let create = statement_position(&conn, "INTO dbo.orders_staging_").unwrap();
    let merge = statement_position(&conn, "MERGE dbo.orders USING").unwrap();
    let drop = statement_position(&conn, "DROP TABLE dbo.orders_staging_").unwrap();
    assert!(create < merge && merge < drop);
}

#[tokio::test]
async fn non_merge_operation_kind_is_rejected() {
    let (conn, _writer, orchestrator) = harness();

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .merge(&conn, &ctx, OperationKind::Truncate, &mut boxed_orders(1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn staging_is_dropped_even_when_the_merge_fails() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.fail_statements_containing(" MODE ");

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(2),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StatementFailed);
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}

#[tokio::test]
async fn failed_merge_still_drops_both_temp_tables_and_disables_identity() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.fail_statements_containing(" MODE ");

    let config = BulkConfig {
        use_output_table: true,
        keep_identity: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(1),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StatementFailed);
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
    assert_eq!(
        conn.identity_toggles(),
        vec![
            ("dbo.orders".to_string(), true),
            ("dbo.orders".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn cleanup_failures_surface_when_the_protocol_succeeded() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.fail_statements_containing("DROP TABLE");

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(2),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CleanupFailed);
    // The merge itself still happened.
    assert_eq!(conn.rows(&orders_table()).unwrap().len(), 2);
}

#[tokio::test]
async fn cleanup_failures_never_mask_the_primary_error() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.fail_statements_containing(" MODE ");
    conn.fail_statements_containing("DROP TABLE");

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(1),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StatementFailed);
}

#[tokio::test]
async fn delete_capable_output_table_relaxes_nullability() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        use_output_table: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdateOrDelete,
            &mut boxed_orders(1),
        )
        .await
        .unwrap();

    let create_output = conn
        .executed()
        .into_iter()
        .find(|sql| sql.contains("INTO dbo.orders_output_"))
        .unwrap();
    assert!(create_output.contains("WITH NULLABLE"));
    // The output table is dropped with the staging table.
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
}

#[tokio::test]
async fn delete_operation_runs_the_staged_protocol_with_a_nullable_output() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        use_output_table: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator
        .merge(&conn, &ctx, OperationKind::Delete, &mut boxed_orders(2))
        .await
        .unwrap();

    // Plain deletes stage rows like any other merge kind.
    let create = statement_position(&conn, "INTO dbo.orders_staging_").unwrap();
    let merge = statement_position(&conn, "MODE Delete").unwrap();
    assert!(create < merge);

    // Delete results carry NULL non-key columns, so the output table relaxes
    // nullability even without the upsert half.
    let create_output = conn
        .executed()
        .into_iter()
        .find(|sql| sql.contains("INTO dbo.orders_output_"))
        .unwrap();
    assert!(create_output.contains("WITH NULLABLE"));
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
}

#[tokio::test]
async fn output_capture_applies_server_generated_values() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let assigned_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    // Columns in schema order: id, name, status, placed_at, created_at,
    // row_version, metadata, location, node_path, shipping_city,
    // shipping_zip, customer_id.
    conn.set_merge_output(vec![vec![
        Value::I64(42),
        Value::String("order-1".to_string()),
        Value::Null,
        Value::Null,
        Value::TimestampTz(assigned_at),
        Value::Bytes(vec![9, 9]),
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
    ]]);

    let config = BulkConfig {
        use_output_table: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator
        .merge(&conn, &ctx, OperationKind::InsertOrUpdate, &mut entities)
        .await
        .unwrap();

    let entity = entities[0].as_ref();
    assert_eq!(scalar(entity, "id"), Value::I64(42));
    assert_eq!(scalar(entity, "created_at"), Value::TimestampTz(assigned_at));
    assert_eq!(scalar(entity, "row_version"), Value::Bytes(vec![9, 9]));
    // Non-generated columns are left alone.
    assert_eq!(scalar(entity, "name"), Value::String("order-1".to_string()));
}

#[tokio::test]
async fn output_rows_matching_no_entity_never_overwrite_a_matched_one() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let assigned_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let output_row = |id: i64, version: Vec<u8>| {
        vec![
            Value::I64(id),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::TimestampTz(assigned_at),
            Value::Bytes(version),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]
    };
    // The second row's key belongs to no entity in the batch; with the only
    // entity already claimed by key it has no owner and must be dropped.
    conn.set_merge_output(vec![output_row(1, vec![1, 1]), output_row(99, vec![9, 9])]);

    let config = BulkConfig {
        use_output_table: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator
        .merge(&conn, &ctx, OperationKind::InsertOrUpdate, &mut entities)
        .await
        .unwrap();

    let entity = entities[0].as_ref();
    assert_eq!(scalar(entity, "id"), Value::I64(1));
    assert_eq!(scalar(entity, "row_version"), Value::Bytes(vec![1, 1]));
}

#[tokio::test]
async fn delete_result_rows_are_skipped_during_capture() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    conn.set_merge_output(vec![vec![
        Value::I64(1),
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
    ]]);

    let config = BulkConfig {
        use_output_table: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdateOrDelete,
            &mut entities,
        )
        .await
        .unwrap();

    // The deleted entity keeps its in-memory state.
    let entity = entities[0].as_ref();
    assert_eq!(scalar(entity, "id"), Value::I64(1));
    assert_eq!(scalar(entity, "row_version"), Value::Bytes(vec![0, 0, 0, 1]));
}

#[tokio::test]
async fn keep_identity_toggles_identity_insert_exactly_once() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        keep_identity: true,
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(1),
        )
        .await
        .unwrap();

    assert_eq!(
        conn.identity_toggles(),
        vec![
            ("dbo.orders".to_string(), true),
            ("dbo.orders".to_string(), false),
        ]
    );

    let merge = statement_position(&conn, "MERGE dbo.orders USING").unwrap();
    let disable = statement_position(&conn, "SET IDENTITY_INSERT dbo.orders OFF").unwrap();
    assert!(merge < disable);
}

#[tokio::test]
async fn custom_post_process_runs_after_the_merge() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig {
        custom_post_process: Some("EXEC refresh_stats".to_string()),
        ..explicit_drop_config()
    };
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(1),
        )
        .await
        .unwrap();

    let merge = statement_position(&conn, "MERGE dbo.orders USING").unwrap();
    let post = statement_position(&conn, "EXEC refresh_stats").unwrap();
    assert!(merge < post);
}

#[tokio::test]
async fn cancellation_before_the_first_round_trip_executes_nothing() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let (tx, signal) = create_cancellation();
    tx.send(true).unwrap();

    let config = BulkConfig::default();
    let ctx =
        OperationContext::new(orders_table(), ORDER_TYPE, &config).with_cancellation(signal);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(1),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn cancellation_after_the_transfer_still_drops_the_staging_table() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    // The fake writer reports progress while rows land in staging, so the
    // signal flips between the transfer and the merge statement.
    let (tx, signal) = create_cancellation();
    let sink: ProgressSink = Arc::new(move |_| {
        let _ = tx.send(true);
    });

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config)
        .with_cancellation(signal)
        .with_progress(sink);

    let err = orchestrator
        .merge(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(2),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    // Staging was created and loaded, but the merge never ran.
    assert!(statement_position(&conn, "INTO dbo.orders_staging_").is_some());
    assert!(statement_position(&conn, "MERGE dbo.orders USING").is_none());
    // The partial transfer still went through the cleanup phase.
    assert!(statement_position(&conn, "DROP TABLE dbo.orders_staging_").is_some());
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}

#[test]
fn merge_blocking_matches_the_async_form() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = explicit_drop_config();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator
        .merge_blocking(
            &conn,
            &ctx,
            OperationKind::InsertOrUpdate,
            &mut boxed_orders(2),
        )
        .unwrap();

    assert_eq!(conn.rows(&orders_table()).unwrap().len(), 2);
}
