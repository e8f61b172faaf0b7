use bulkstage::config::BulkConfig;
use bulkstage::orchestrator::OperationContext;
use bulkstage::test_utils::sample::ORDER_TYPE;
use bulkstage::types::Value;

use crate::support::{harness, orders_table};

#[tokio::test]
async fn truncate_clears_all_rows() {
    let (conn, _writer, orchestrator) = harness();
    conn.insert_rows(
        &orders_table(),
        vec![vec![Value::I64(1)], vec![Value::I64(2)]],
    );

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator.truncate(&conn, &ctx).await.unwrap();

    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}

#[tokio::test]
async fn truncate_is_idempotent() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator.truncate(&conn, &ctx).await.unwrap();
    orchestrator.truncate(&conn, &ctx).await.unwrap();

    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}

#[test]
fn truncate_blocking_matches_the_async_form() {
    let (conn, _writer, orchestrator) = harness();
    conn.insert_rows(&orders_table(), vec![vec![Value::I64(1)]]);

    let config = BulkConfig::default();
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);

    orchestrator.truncate_blocking(&conn, &ctx).unwrap();

    assert!(conn.rows(&orders_table()).unwrap().is_empty());
}
