//! The bulk writer collaborator.
//!
//! The underlying bulk-transfer wire protocol is out of scope: the
//! orchestrator hands a transient [`RowBuffer`] to a [`BulkWriter`] together
//! with batching knobs and a progress callback, and gets back the number of
//! rows written. Batching and chunking are internal to the writer.

use std::future::Future;

use crate::config::BulkConfig;
use crate::error::BulkResult;
use crate::schema::TableName;
use crate::types::RowBuffer;

/// Knobs forwarded to the bulk writer for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkWriterConfig {
    /// Rows per transfer batch.
    pub batch_size: usize,
    /// Transfer timeout in milliseconds.
    pub timeout_ms: u64,
    /// Rows between progress notifications.
    pub notify_after: u64,
    /// Whether the writer may stream rows instead of buffering batches.
    pub streaming: bool,
}

impl From<&BulkConfig> for BulkWriterConfig {
    fn from(config: &BulkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            timeout_ms: config.timeout_ms,
            notify_after: config.notify_after,
            streaming: config.streaming,
        }
    }
}

/// Callback invoked by the writer with the running rows-transferred counter.
pub type TransferProgress<'a> = dyn Fn(u64) + Send + Sync + 'a;

/// Transfers a materialized row buffer into a destination table.
///
/// A column-count mismatch against the destination must surface as
/// [`crate::error::ErrorKind::TransferColumnMismatch`]; the orchestrator
/// keys its diagnostic existence probe off that kind.
pub trait BulkWriter: Send + Sync {
    /// Writes the buffer into `dest`, reporting progress periodically.
    ///
    /// Returns the number of rows written. Rows are written in buffer order.
    fn write(
        &self,
        dest: &TableName,
        config: &BulkWriterConfig,
        buffer: &RowBuffer,
        on_progress: &TransferProgress<'_>,
    ) -> impl Future<Output = BulkResult<u64>> + Send;
}
