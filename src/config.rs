//! Configuration for bulk operations.
//!
//! [`BulkConfig`] is the per-call options block recognized by the schema
//! builder, the materializer, and the orchestrator. It is pure data: runtime
//! hooks (progress sink, shadow value resolver, cancellation) travel in the
//! operation context instead, so the config stays serializable and can be
//! loaded from files the same way other pipeline settings are.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while validating a [`BulkConfig`].
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field value is outside its allowed range.
    #[error("invalid value for field '{field}': {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

/// Options block for one bulk operation.
///
/// A config instance is treated as a read-only snapshot for the duration of a
/// call; the derived table schema is rebuilt per call because the config and
/// operation kind may differ between calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkConfig {
    /// Number of rows per bulk-transfer batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout, in milliseconds, for a single bulk-transfer round trip.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How many transferred rows between progress notifications.
    #[serde(default = "default_notify_after")]
    pub notify_after: u64,
    /// Whether the bulk writer may stream rows instead of buffering batches.
    #[serde(default)]
    pub streaming: bool,
    /// Capture server-generated values (keys, computed columns) into a temp
    /// output table and reconcile them back into the caller's entities.
    #[serde(default)]
    pub use_output_table: bool,
    /// Preserve caller-supplied values for the identity column by toggling
    /// identity-insert mode around the merge statement.
    #[serde(default)]
    pub keep_identity: bool,
    /// Whether staging tables are engine-auto-managed temp tables that drop
    /// themselves when the session ends. When false the orchestrator issues
    /// explicit drops during cleanup.
    #[serde(default = "default_use_temp_storage")]
    pub use_temp_storage: bool,
    /// Include shadow properties (columns with no settable field on the
    /// domain object) in the derived schema.
    #[serde(default)]
    pub enable_shadow_properties: bool,
    /// Resolve shadow property values through the caller-supplied resolver
    /// instead of the default entry-derived value.
    #[serde(default)]
    pub dynamic_shadow_values: bool,
    /// On Read, wholesale-replace the caller's entity fields instead of
    /// copying forward only matched scalar fields.
    #[serde(default)]
    pub replace_read_entities: bool,
    /// Spatial reference identifier stamped into encoded spatial values.
    #[serde(default = "default_srid")]
    pub srid: i32,
    /// The database's native maximum sub-second precision, in decimal digits.
    /// Columns declaring a lower precision get their tick count rounded.
    #[serde(default = "default_datetime_max_precision")]
    pub datetime_max_precision: u8,
    /// Literal port of the concurrency-token rule: the token column is
    /// included in the schema unless this flag is set.
    #[serde(default)]
    pub omit_unchanged_concurrency_token: bool,
    /// Explicit comparison-column list for the merge join. Conflicts with
    /// spatial and hierarchical columns, which cannot be compared by value.
    #[serde(default)]
    pub compare_columns: Option<Vec<String>>,
    /// Optional statement executed after the merge, before cleanup.
    #[serde(default)]
    pub custom_post_process: Option<String>,
}

impl BulkConfig {
    /// Default number of rows per bulk-transfer batch.
    pub const DEFAULT_BATCH_SIZE: usize = 2000;

    /// Default bulk-transfer timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// Default progress notification granularity in rows.
    pub const DEFAULT_NOTIFY_AFTER: u64 = 1000;

    /// Default spatial reference identifier (WGS 84).
    pub const DEFAULT_SRID: i32 = 4326;

    /// Default native sub-second precision in decimal digits.
    pub const DEFAULT_DATETIME_MAX_PRECISION: u8 = 7;

    /// Validates configuration settings.
    ///
    /// Ensures batch size is non-zero and precision/srid values are in range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.datetime_max_precision > 9 {
            return Err(ValidationError::InvalidFieldValue {
                field: "datetime_max_precision".to_string(),
                constraint: "must be at most 9 decimal digits".to_string(),
            });
        }

        if self.srid < 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "srid".to_string(),
                constraint: "must be non-negative".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_ms: default_timeout_ms(),
            notify_after: default_notify_after(),
            streaming: false,
            use_output_table: false,
            keep_identity: false,
            use_temp_storage: default_use_temp_storage(),
            enable_shadow_properties: false,
            dynamic_shadow_values: false,
            replace_read_entities: false,
            srid: default_srid(),
            datetime_max_precision: default_datetime_max_precision(),
            omit_unchanged_concurrency_token: false,
            compare_columns: None,
            custom_post_process: None,
        }
    }
}

fn default_batch_size() -> usize {
    BulkConfig::DEFAULT_BATCH_SIZE
}

fn default_timeout_ms() -> u64 {
    BulkConfig::DEFAULT_TIMEOUT_MS
}

fn default_notify_after() -> u64 {
    BulkConfig::DEFAULT_NOTIFY_AFTER
}

fn default_use_temp_storage() -> bool {
    true
}

fn default_srid() -> i32 {
    BulkConfig::DEFAULT_SRID
}

fn default_datetime_max_precision() -> u8 {
    BulkConfig::DEFAULT_DATETIME_MAX_PRECISION
}
