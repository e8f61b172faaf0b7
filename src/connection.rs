//! The connection/transaction scope collaborator.
//!
//! The connection lifecycle is external to the core: the orchestrator drives
//! one logical sequence of round trips over a single scope and never
//! coordinates concurrent operations on the same connection.

use std::future::Future;

use crate::error::BulkResult;
use crate::schema::TableName;
use crate::statements::Statement;
use crate::types::Value;

/// One open connection/transaction scope.
///
/// Every method is a database round trip and therefore a suspension point of
/// the async code path. Implementations provide the blocking behavior only
/// through the orchestrator's blocking wrappers; the trait itself is async.
pub trait ConnectionScope: Send + Sync {
    /// Executes a statement and returns the affected row count.
    fn execute(&self, statement: &Statement) -> impl Future<Output = BulkResult<u64>> + Send;

    /// Executes a query and returns its rows, values in select-list order.
    fn query(
        &self,
        statement: &Statement,
    ) -> impl Future<Output = BulkResult<Vec<Vec<Value>>>> + Send;

    /// Checks whether a table exists in the destination.
    ///
    /// Used only by the diagnostic probe after a column-mismatch transfer
    /// failure.
    fn table_exists(&self, table: &TableName) -> impl Future<Output = BulkResult<bool>> + Send;
}
