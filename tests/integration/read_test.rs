use bulkstage::config::BulkConfig;
use bulkstage::orchestrator::OperationContext;
use bulkstage::test_utils::sample::ORDER_TYPE;
use bulkstage::types::Value;
use chrono::{NaiveDate, TimeZone, Utc};

use crate::support::{boxed_orders, harness, orders_table, scalar};

fn read_config(replace: bool) -> BulkConfig {
    BulkConfig {
        replace_read_entities: replace,
        use_temp_storage: false,
        ..BulkConfig::default()
    }
}

/// A full-width result row for the order schema, keyed by `id`.
fn db_row(id: i64, name: &str) -> Vec<Value> {
    let placed_at = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    let created_at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

    // Columns in schema order: id, name, status, placed_at, created_at,
    // row_version, metadata, location, node_path, shipping_city,
    // shipping_zip, customer_id.
    vec![
        Value::I64(id),
        Value::String(name.to_string()),
        Value::String("shipped".to_string()),
        Value::Timestamp(placed_at),
        Value::TimestampTz(created_at),
        Value::Bytes(vec![7]),
        Value::String("{\"priority\":9}".to_string()),
        Value::Null,
        Value::Null,
        Value::String("Porto".to_string()),
        Value::Null,
        Value::Null,
    ]
}

#[tokio::test]
async fn read_copies_matched_fields_forward() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.set_join_result(vec![db_row(1, "from-db")]);

    let config = read_config(false);
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator.read(&conn, &ctx, &mut entities).await.unwrap();

    let entity = entities[0].as_ref();
    assert_eq!(scalar(entity, "name"), Value::String("from-db".to_string()));
    // The converter maps the provider text back to the domain code.
    assert_eq!(scalar(entity, "status"), Value::I32(1));
    assert_eq!(scalar(entity, "row_version"), Value::Bytes(vec![7]));
    assert_eq!(
        scalar(entity, "metadata"),
        Value::Json(serde_json::json!({ "priority": 9 }))
    );
    // Keys are not copied forward.
    assert_eq!(scalar(entity, "id"), Value::I64(1));
    // Nested owned fields are written through the owned object.
    match entity.get("shipping") {
        Some(bulkstage::entity::Field::Owned(Some(shipping))) => {
            assert_eq!(scalar(shipping, "city"), Value::String("Porto".to_string()));
            assert_eq!(scalar(shipping, "zip"), Value::Null);
        }
        _ => panic!("expected a loaded shipping address"),
    }

    // The staging table was cleaned up.
    assert_eq!(conn.table_names(), vec!["dbo.orders".to_string()]);
}

#[tokio::test]
async fn read_with_replace_overwrites_keys_too() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.set_join_result(vec![db_row(77, "replacement")]);

    let config = read_config(true);
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator.read(&conn, &ctx, &mut entities).await.unwrap();

    let entity = entities[0].as_ref();
    assert_eq!(scalar(entity, "id"), Value::I64(77));
    assert_eq!(
        scalar(entity, "name"),
        Value::String("replacement".to_string())
    );
}

#[tokio::test]
async fn read_correlates_result_rows_by_key() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    // Result order deliberately reversed relative to the input order.
    conn.set_join_result(vec![db_row(2, "second"), db_row(1, "first")]);

    let config = read_config(false);
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(2);

    orchestrator.read(&conn, &ctx, &mut entities).await.unwrap();

    assert_eq!(
        scalar(entities[0].as_ref(), "name"),
        Value::String("first".to_string())
    );
    assert_eq!(
        scalar(entities[1].as_ref(), "name"),
        Value::String("second".to_string())
    );
}

#[tokio::test]
async fn unmatched_entities_keep_their_state() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.set_join_result(vec![db_row(1, "matched")]);

    let config = read_config(false);
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(2);

    orchestrator.read(&conn, &ctx, &mut entities).await.unwrap();

    assert_eq!(
        scalar(entities[0].as_ref(), "name"),
        Value::String("matched".to_string())
    );
    assert_eq!(
        scalar(entities[1].as_ref(), "name"),
        Value::String("order-2".to_string())
    );
}

#[test]
fn read_blocking_matches_the_async_form() {
    let (conn, _writer, orchestrator) = harness();
    conn.create_table(&orders_table());
    conn.set_join_result(vec![db_row(1, "from-db")]);

    let config = read_config(false);
    let ctx = OperationContext::new(orders_table(), ORDER_TYPE, &config);
    let mut entities = boxed_orders(1);

    orchestrator.read_blocking(&conn, &ctx, &mut entities).unwrap();

    assert_eq!(
        scalar(entities[0].as_ref(), "name"),
        Value::String("from-db".to_string())
    );
}
