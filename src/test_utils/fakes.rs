//! Fake collaborators backed by shared in-memory state.
//!
//! [`FakeStatementBuilder`] emits a small recognizable SQL dialect, and
//! [`FakeConnection`] interprets exactly that dialect against an in-memory
//! table map. [`FakeBulkWriter`] writes buffers into the same table map, so
//! an orchestrator wired to all three behaves like a miniature database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bulk_error;
use crate::connection::ConnectionScope;
use crate::error::{BulkResult, ErrorKind};
use crate::schema::{TableName, TableSchema};
use crate::statements::{Statement, StatementBuilder};
use crate::types::{OperationKind, RowBuffer, Value};
use crate::writer::{BulkWriter, BulkWriterConfig, TransferProgress};

/// Statement builder emitting the dialect [`FakeConnection`] interprets.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeStatementBuilder;

impl StatementBuilder for FakeStatementBuilder {
    fn create_table_copy(
        &self,
        source: &TableName,
        dest: &TableName,
        _schema: &TableSchema,
        nullable_override: bool,
    ) -> Statement {
        let suffix = if nullable_override { " WITH NULLABLE" } else { "" };
        Statement::new(format!(
            "SELECT * INTO {dest} FROM {source} WHERE 1 = 0{suffix}"
        ))
    }

    fn drop_table(&self, table: &TableName, auto_managed: bool) -> Option<Statement> {
        if auto_managed {
            return None;
        }

        Some(Statement::new(format!("DROP TABLE {table}")))
    }

    fn merge(
        &self,
        schema: &TableSchema,
        staging: &TableName,
        output: Option<&TableName>,
        operation: OperationKind,
        defaulted_columns: &[String],
    ) -> Statement {
        let mut sql = format!(
            "MERGE {} USING {staging} MODE {operation:?}",
            schema.table()
        );
        if !defaulted_columns.is_empty() {
            sql.push_str(&format!(" EXCLUDING {}", defaulted_columns.join(",")));
        }
        if let Some(output) = output {
            sql.push_str(&format!(" OUTPUT INTO {output}"));
        }

        Statement::new(sql)
    }

    fn select_join(&self, schema: &TableSchema, staging: &TableName) -> Statement {
        Statement::new(format!(
            "SELECT t.* FROM {} AS t JOIN {staging}",
            schema.table()
        ))
    }

    fn set_identity_insert(&self, table: &TableName, enabled: bool) -> Statement {
        let mode = if enabled { "ON" } else { "OFF" };
        Statement::new(format!("SET IDENTITY_INSERT {table} {mode}"))
    }

    fn select_output(&self, _schema: &TableSchema, output: &TableName) -> Statement {
        Statement::new(format!("SELECT * FROM {output}"))
    }

    fn truncate(&self, table: &TableName) -> Statement {
        Statement::new(format!("TRUNCATE TABLE {table}"))
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    tables: BTreeMap<String, Vec<Vec<Value>>>,
    executed: Vec<String>,
    identity_toggles: Vec<(String, bool)>,
    fail_on: Vec<String>,
    merge_output: Vec<Vec<Value>>,
    join_result: Vec<Vec<Value>>,
}

type SharedState = Arc<Mutex<ConnectionState>>;

/// In-memory connection scope interpreting the fake dialect.
#[derive(Debug, Default, Clone)]
pub struct FakeConnection {
    state: SharedState,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap()
    }

    /// Pre-creates an empty destination table.
    pub fn create_table(&self, table: &TableName) {
        self.lock().tables.insert(table.to_string(), Vec::new());
    }

    /// Makes every statement whose SQL contains `fragment` fail.
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) {
        self.lock().fail_on.push(fragment.into());
    }

    /// Stops injecting statement failures.
    pub fn clear_failures(&self) {
        self.lock().fail_on.clear();
    }

    /// Seeds a table with rows, creating it if needed.
    pub fn insert_rows(&self, table: &TableName, rows: Vec<Vec<Value>>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Sets the rows the next output-table capture will hold.
    pub fn set_merge_output(&self, rows: Vec<Vec<Value>>) {
        self.lock().merge_output = rows;
    }

    /// Sets the rows the next staging join-select will return.
    pub fn set_join_result(&self, rows: Vec<Vec<Value>>) {
        self.lock().join_result = rows;
    }

    /// Returns the rows currently stored for a table.
    pub fn rows(&self, table: &TableName) -> Option<Vec<Vec<Value>>> {
        self.lock().tables.get(&table.to_string()).cloned()
    }

    /// Returns the names of all existing tables.
    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Returns every executed statement's SQL, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Returns the identity-insert toggles in execution order.
    pub fn identity_toggles(&self) -> Vec<(String, bool)> {
        self.lock().identity_toggles.clone()
    }

    fn apply(&self, sql: &str) -> BulkResult<u64> {
        let mut state = self.lock();
        state.executed.push(sql.to_string());

        if state.fail_on.iter().any(|fragment| sql.contains(fragment)) {
            return Err(bulk_error!(
                ErrorKind::StatementFailed,
                "Injected statement failure",
                detail = sql.to_string()
            ));
        }

        if let Some(rest) = sql.strip_prefix("SELECT * INTO ") {
            let dest = rest
                .split(" FROM ")
                .next()
                .unwrap_or_default()
                .to_string();
            state.tables.insert(dest, Vec::new());
            return Ok(0);
        }

        if let Some(table) = sql.strip_prefix("DROP TABLE ") {
            state.tables.remove(table);
            return Ok(0);
        }

        if let Some(rest) = sql.strip_prefix("MERGE ") {
            let target = rest.split(' ').next().unwrap_or_default().to_string();
            let staging = rest
                .split(" USING ")
                .nth(1)
                .and_then(|s| s.split(' ').next())
                .unwrap_or_default()
                .to_string();

            let staged = state.tables.get(&staging).cloned().unwrap_or_default();
            let affected = staged.len() as u64;
            state.tables.entry(target).or_default().extend(staged);

            if let Some(output) = rest.split(" OUTPUT INTO ").nth(1) {
                let captured = state.merge_output.clone();
                state.tables.insert(output.to_string(), captured);
            }

            return Ok(affected);
        }

        if let Some(rest) = sql.strip_prefix("SET IDENTITY_INSERT ") {
            let mut parts = rest.rsplitn(2, ' ');
            let mode = parts.next().unwrap_or_default();
            let table = parts.next().unwrap_or_default().to_string();
            state.identity_toggles.push((table, mode == "ON"));
            return Ok(0);
        }

        if let Some(table) = sql.strip_prefix("TRUNCATE TABLE ") {
            state.tables.entry(table.to_string()).or_default().clear();
            return Ok(0);
        }

        // Anything else (custom post-process text) is recorded and succeeds.
        Ok(0)
    }
}

impl ConnectionScope for FakeConnection {
    async fn execute(&self, statement: &Statement) -> BulkResult<u64> {
        self.apply(&statement.sql)
    }

    async fn query(&self, statement: &Statement) -> BulkResult<Vec<Vec<Value>>> {
        let mut state = self.lock();
        state.executed.push(statement.sql.clone());

        if let Some(output) = statement.sql.strip_prefix("SELECT * FROM ") {
            return Ok(state.tables.get(output).cloned().unwrap_or_default());
        }

        if statement.sql.starts_with("SELECT t.* FROM ") {
            return Ok(state.join_result.clone());
        }

        Ok(Vec::new())
    }

    async fn table_exists(&self, table: &TableName) -> BulkResult<bool> {
        Ok(self.lock().tables.contains_key(&table.to_string()))
    }
}

/// Bulk writer appending rows into the shared table map.
#[derive(Default, Clone)]
pub struct FakeBulkWriter {
    state: SharedState,
    fail_with: Arc<Mutex<Option<ErrorKind>>>,
}

impl FakeBulkWriter {
    /// Creates a writer sharing the connection's table map.
    pub fn for_connection(conn: &FakeConnection) -> Self {
        Self {
            state: Arc::clone(&conn.state),
            fail_with: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next writes fail with the given kind.
    pub fn fail_with(&self, kind: ErrorKind) {
        *self.fail_with.lock().unwrap() = Some(kind);
    }
}

impl BulkWriter for FakeBulkWriter {
    async fn write(
        &self,
        dest: &TableName,
        config: &BulkWriterConfig,
        buffer: &RowBuffer,
        on_progress: &TransferProgress<'_>,
    ) -> BulkResult<u64> {
        if let Some(kind) = *self.fail_with.lock().unwrap() {
            return Err(bulk_error!(
                kind,
                "Injected bulk transfer failure",
                detail = dest.to_string()
            ));
        }

        let mut state = self.state.lock().unwrap();
        let Some(rows) = state.tables.get_mut(&dest.to_string()) else {
            return Err(bulk_error!(
                ErrorKind::TransferFailed,
                "Bulk transfer destination does not exist",
                detail = dest.to_string()
            ));
        };

        let mut written = 0u64;
        for row in buffer.rows() {
            rows.push(row.clone());
            written += 1;
            if config.notify_after > 0 && written % config.notify_after == 0 {
                on_progress(written);
            }
        }
        on_progress(written);

        Ok(written)
    }
}
