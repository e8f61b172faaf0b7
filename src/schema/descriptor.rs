//! Column descriptors and the derived table schema.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::conversions::spatial::SpatialKind;
use crate::error::{BulkResult, ErrorKind};
use crate::types::{BufferColumn, StorageType, Value};
use crate::bail;

/// A fully qualified table name consisting of a schema and table name.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TableName {
    /// The schema containing the table.
    pub schema: String,
    /// The name of the table within the schema.
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Derives a sibling table name with the given suffix appended.
    ///
    /// Used for staging, output, and schema-probe tables, which live next to
    /// the target table.
    pub fn with_suffix(&self, suffix: &str) -> TableName {
        TableName {
            schema: self.schema.clone(),
            name: format!("{}{suffix}", self.name),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{0}.{1}", self.schema, self.name))
    }
}

/// An ordered list of property names leading from the root entity to a field.
///
/// Paths of length greater than one address scalar fields of nested owned
/// objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    /// Creates a single-segment path addressing a root-level property.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Returns a new path with one more segment appended.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Returns the path segments in root-to-leaf order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the leaf property name.
    pub fn leaf(&self) -> &str {
        self.0.last().expect("paths have at least one segment")
    }

    /// Returns whether this path addresses a field of a nested owned object.
    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A domain-to-provider value conversion registered for a column.
///
/// When present, the converter supersedes the column's natural storage type
/// with its provider-side type, and [`ValueConverter::to_provider`] runs on
/// every materialized value. `from_provider` runs on output reconciliation.
#[derive(Clone)]
pub struct ValueConverter {
    /// The provider-side storage type produced by `to_provider`.
    pub provider_type: StorageType,
    /// Domain value to provider value.
    pub to_provider: Arc<dyn Fn(Value) -> BulkResult<Value> + Send + Sync>,
    /// Provider value back to domain value.
    pub from_provider: Arc<dyn Fn(Value) -> BulkResult<Value> + Send + Sync>,
}

impl fmt::Debug for ValueConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueConverter")
            .field("provider_type", &self.provider_type)
            .finish_non_exhaustive()
    }
}

/// How a foreign-key shadow column resolves its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedKey {
    /// The navigation property on the owning entity.
    pub navigation: String,
    /// The key property on the related entity.
    pub key_property: String,
}

/// One target column of a derived [`TableSchema`].
///
/// Carries everything the materializer needs to extract and convert a value
/// from a domain object, plus the classification flags the orchestrator and
/// statement builder read.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// Property names from the root entity to the field backing this column.
    pub path: PropertyPath,
    /// Destination column name, including any owned-object prefix.
    pub column_name: String,
    /// Storage type after narrowing and conversion.
    pub storage_type: StorageType,
    /// Whether the destination column accepts NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub is_key: bool,
    /// Whether the column is a server-generated identity column.
    pub is_identity: bool,
    /// Whether the column has no settable field on the domain object.
    pub is_shadow: bool,
    /// Whether the column carries a related entity's key.
    pub is_foreign_key_shadow: bool,
    /// Whether the property serializes to a single JSON text column.
    pub is_json: bool,
    /// Whether the property holds a spatial geometry value.
    pub is_spatial: bool,
    /// Whether the property holds a hierarchical path value.
    pub is_hierarchical: bool,
    /// Whether this shadow column was detected as the type-hierarchy
    /// discriminator and gets stamped with the concrete type name.
    pub is_discriminator: bool,
    /// Whether the column is a concurrency token.
    pub is_concurrency_token: bool,
    /// Whether the server assigns a default when the column is omitted on insert.
    pub has_server_default_on_insert: bool,
    /// Declared sub-second precision for temporal columns, in decimal digits.
    pub declared_precision: Option<u8>,
    /// Geography vs geometry subtype for spatial columns.
    pub spatial_kind: Option<SpatialKind>,
    /// How to resolve the related key for foreign-key shadow columns.
    pub related: Option<RelatedKey>,
    /// Optional registered domain-to-provider conversion.
    pub converter: Option<ValueConverter>,
}

/// The ordered set of target columns derived for one operation.
///
/// Built fresh per call from a snapshot of the entity schema provider's
/// output; never cached across calls because the operation kind and config
/// may differ.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: TableName,
    columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Creates a schema, enforcing column-name and property-path uniqueness.
    pub fn new(table: TableName, columns: Vec<ColumnDescriptor>) -> BulkResult<TableSchema> {
        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for column in &columns {
            if !names.insert(column.column_name.as_str()) {
                bail!(
                    ErrorKind::SchemaResolution,
                    "Duplicate column name in derived schema",
                    detail = format!("table {table}, column {}", column.column_name)
                );
            }
            if !paths.insert(&column.path) {
                bail!(
                    ErrorKind::SchemaResolution,
                    "Duplicate property path in derived schema",
                    detail = format!("table {table}, path {}", column.path)
                );
            }
        }

        Ok(Self { table, columns })
    }

    /// Returns the target table name.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Returns the columns in destination order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Returns the column with the given destination name, if present.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    /// Returns the primary-key columns in destination order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_key)
    }

    /// Returns the identity column, if the target has one.
    pub fn identity_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.is_identity)
    }

    /// Returns the names of columns the server assigns defaults for.
    ///
    /// The statement builder needs these to exclude defaulted columns from
    /// the merge's insert column list.
    pub fn server_defaulted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.has_server_default_on_insert)
            .map(|c| c.column_name.clone())
            .collect()
    }

    /// Returns the buffer header matching this schema's column order.
    pub fn buffer_columns(&self) -> Vec<BufferColumn> {
        self.columns
            .iter()
            .map(|c| BufferColumn {
                name: c.column_name.clone(),
                storage_type: c.storage_type,
            })
            .collect()
    }

    /// Marks the named column as the detected discriminator.
    pub(crate) fn mark_discriminator(&mut self, column_name: &str) {
        if let Some(column) = self
            .columns
            .iter_mut()
            .find(|c| c.column_name == column_name)
        {
            column.is_discriminator = true;
        }
    }
}
