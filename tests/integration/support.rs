//! Shared wiring for the orchestrator tests.

use std::sync::{Arc, Mutex};

use bulkstage::entity::{Entity, Field};
use bulkstage::orchestrator::BulkMergeOrchestrator;
use bulkstage::progress::ProgressSink;
use bulkstage::schema::TableName;
use bulkstage::test_utils::fakes::{FakeBulkWriter, FakeConnection, FakeStatementBuilder};
use bulkstage::test_utils::provider::MapSchemaProvider;
use bulkstage::test_utils::sample::sample_order;
use bulkstage::types::Value;

pub type TestOrchestrator =
    BulkMergeOrchestrator<MapSchemaProvider, FakeStatementBuilder, FakeBulkWriter>;

/// Wires an orchestrator to a fresh fake connection and writer.
pub fn harness() -> (FakeConnection, FakeBulkWriter, TestOrchestrator) {
    let conn = FakeConnection::new();
    let writer = FakeBulkWriter::for_connection(&conn);
    let orchestrator = BulkMergeOrchestrator::new(
        MapSchemaProvider::with_sample_model(),
        FakeStatementBuilder,
        writer.clone(),
    );

    (conn, writer, orchestrator)
}

pub fn orders_table() -> TableName {
    TableName::new("dbo", "orders")
}

/// Boxes `count` sample orders with ids `1..=count`.
pub fn boxed_orders(count: i64) -> Vec<Box<dyn Entity>> {
    (1..=count)
        .map(|id| Box::new(sample_order(id)) as Box<dyn Entity>)
        .collect()
}

/// Reads a scalar field back through the entity trait.
pub fn scalar(entity: &dyn Entity, property: &str) -> Value {
    match entity.get(property) {
        Some(Field::Scalar(value)) => value,
        _ => panic!("expected a scalar field named {property}"),
    }
}

/// A progress sink that records every received fraction.
pub fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<f64>>>) {
    let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink: ProgressSink = {
        let seen = Arc::clone(&seen);
        Arc::new(move |fraction| seen.lock().unwrap().push(fraction))
    };

    (sink, seen)
}

/// Index of the first executed statement containing `fragment`.
pub fn statement_position(conn: &FakeConnection, fragment: &str) -> Option<usize> {
    conn.executed().iter().position(|sql| sql.contains(fragment))
}
