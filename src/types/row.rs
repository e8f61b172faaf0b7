//! The materialized row buffer handed to the bulk writer.

use crate::types::value::{StorageType, Value};

/// One column header of a [`RowBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferColumn {
    /// Destination column name.
    pub name: String,
    /// Storage type every value in this column binds to.
    pub storage_type: StorageType,
}

/// The row-oriented result of materializing a batch of entities.
///
/// A [`RowBuffer`] holds an ordered column header and one row per input
/// entity, with values positionally aligned to the header. Rows appear in
/// input enumeration order; downstream output correlation depends on that
/// order being preserved.
///
/// The buffer is transient: it is created fresh per bulk-insert call, consumed
/// immediately by the bulk writer collaborator, and then discarded. It is
/// never persisted or reused across operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBuffer {
    columns: Vec<BufferColumn>,
    rows: Vec<Vec<Value>>,
}

impl RowBuffer {
    /// Creates an empty buffer for the given column header.
    pub fn new(columns: Vec<BufferColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates an empty buffer with capacity reserved for `rows` rows.
    pub fn with_capacity(columns: Vec<BufferColumn>, rows: usize) -> Self {
        Self {
            columns,
            rows: Vec::with_capacity(rows),
        }
    }

    /// Appends a row whose values are aligned to the column header.
    ///
    /// Panics in debug builds if the value count does not match the header
    /// width; the materializer always produces aligned rows.
    pub fn push_row(&mut self, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(values);
    }

    /// Returns the column header in destination order.
    pub fn columns(&self) -> &[BufferColumn] {
        &self.columns
    }

    /// Returns the index of a column by name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Returns the rows in input enumeration order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns the number of rows in the buffer.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the buffer holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the buffer and returns its rows.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}
