//! The statement builder collaborator.
//!
//! SQL-text generation is out of scope for the core: the orchestrator hands a
//! schema descriptor to a [`StatementBuilder`] and gets parameterized
//! statements back. Dialect syntax lives entirely behind this trait.

use crate::schema::{TableName, TableSchema};
use crate::types::{OperationKind, Value};

/// One parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The SQL text.
    pub sql: String,
    /// Positional parameters bound to the statement.
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a statement with positional parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Generates the DDL and DML statements the orchestrator sequences.
///
/// Implementations are pure: they format SQL from the schema descriptor and
/// never touch a connection.
pub trait StatementBuilder: Send + Sync {
    /// Statement creating `dest` as a column-copy of `source`.
    ///
    /// With `nullable_override` set, every column of the copy is forced
    /// nullable; the temp output table needs this because delete-result rows
    /// carry NULL for every non-key column.
    fn create_table_copy(
        &self,
        source: &TableName,
        dest: &TableName,
        schema: &TableSchema,
        nullable_override: bool,
    ) -> Statement;

    /// Statement dropping the given table.
    ///
    /// Returns [`None`] when `auto_managed` is set and the engine drops its
    /// own temp tables, in which case the orchestrator skips the round trip.
    fn drop_table(&self, table: &TableName, auto_managed: bool) -> Option<Statement>;

    /// The merge statement (UPSERT/DELETE-by-join) between the staging table
    /// and the target, optionally writing captured output into `output`.
    ///
    /// `defaulted_columns` lists columns the server assigns defaults for,
    /// which the insert column list must exclude.
    fn merge(
        &self,
        schema: &TableSchema,
        staging: &TableName,
        output: Option<&TableName>,
        operation: OperationKind,
        defaulted_columns: &[String],
    ) -> Statement;

    /// Join-select between the staging table and the target, returning
    /// matched target rows in staging order.
    fn select_join(&self, schema: &TableSchema, staging: &TableName) -> Statement;

    /// Statement toggling identity-insert mode for the target table.
    fn set_identity_insert(&self, table: &TableName, enabled: bool) -> Statement;

    /// Statement selecting all rows of the temp output table in capture order.
    fn select_output(&self, schema: &TableSchema, output: &TableName) -> Statement;

    /// Statement truncating the target table.
    fn truncate(&self, table: &TableName) -> Statement;
}
