//! Bulk data movement for typed domain objects.
//!
//! Materializes object graphs into positional row buffers and drives a
//! staged bulk-merge protocol (insert, upsert, upsert-with-delete, delete,
//! read-back, truncate) against a destination table, with guaranteed staging
//! cleanup and progress reporting. Dialect SQL, the bulk wire protocol, and
//! connection lifecycles stay behind collaborator traits.

pub mod config;
pub mod connection;
pub mod conversions;
pub mod entity;
pub mod error;
pub mod macros;
pub mod materialize;
pub mod orchestrator;
pub mod progress;
pub mod schema;
pub mod signal;
pub mod statements;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod writer;
