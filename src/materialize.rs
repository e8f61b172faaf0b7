//! Materialization of domain objects into a row-oriented buffer.
//!
//! Consumes a derived [`TableSchema`] and a sequence of entities and produces
//! the [`RowBuffer`] handed to the bulk writer. Materialization is CPU-bound
//! object flattening; it never performs I/O and is not a suspension point
//! even inside the async code path.

use crate::bail;
use crate::config::BulkConfig;
use crate::conversions::spatial::SpatialKind;
use crate::conversions::{hierarchy, spatial, temporal};
use crate::entity::{Entity, Field};
use crate::error::{BulkResult, ErrorKind};
use crate::schema::{ColumnDescriptor, PropertyPath, TableSchema};
use crate::types::{RowBuffer, Value};

/// Caller-supplied resolver for dynamically valued shadow properties.
///
/// Invoked as `(entity, shadow_property_name) -> value` when the config
/// requests dynamic shadow resolution instead of the default entry-derived
/// value.
pub type ShadowValueResolver = dyn Fn(&dyn Entity, &str) -> Value + Send + Sync;

/// Flattens entities into rows aligned to a derived schema.
pub struct RowMaterializer<'a> {
    schema: &'a TableSchema,
    config: &'a BulkConfig,
    shadow_resolver: Option<&'a ShadowValueResolver>,
}

impl<'a> RowMaterializer<'a> {
    /// Creates a materializer for one schema and config snapshot.
    pub fn new(schema: &'a TableSchema, config: &'a BulkConfig) -> Self {
        Self {
            schema,
            config,
            shadow_resolver: None,
        }
    }

    /// Attaches the dynamic shadow value resolver.
    pub fn with_shadow_resolver(mut self, resolver: &'a ShadowValueResolver) -> Self {
        self.shadow_resolver = Some(resolver);
        self
    }

    /// Produces one row per entity, in input enumeration order.
    ///
    /// Order preservation is a hard contract: downstream identity and key
    /// correlation for output capture depends on row order matching the
    /// input sequence.
    pub fn materialize(&self, entities: &[&dyn Entity]) -> BulkResult<RowBuffer> {
        // Conflicts are re-checked here so a schema built elsewhere cannot
        // slip past the fail-fast rule; nothing is written before this point.
        self.verify_config()?;

        let mut buffer = RowBuffer::with_capacity(self.schema.buffer_columns(), entities.len());

        for entity in entities {
            let mut values = Vec::with_capacity(self.schema.columns().len());
            for column in self.schema.columns() {
                values.push(self.materialize_value(*entity, column)?);
            }
            buffer.push_row(values);
        }

        Ok(buffer)
    }

    fn verify_config(&self) -> BulkResult<()> {
        if self.config.compare_columns.is_some()
            && self
                .schema
                .columns()
                .iter()
                .any(|c| c.is_spatial || c.is_hierarchical)
        {
            bail!(
                ErrorKind::ConfigConflict,
                "Spatial and hierarchical columns cannot be combined with an explicit compare-column list"
            );
        }

        Ok(())
    }

    /// Extracts and converts one cell for one entity.
    fn materialize_value(
        &self,
        entity: &dyn Entity,
        column: &ColumnDescriptor,
    ) -> BulkResult<Value> {
        if column.is_discriminator {
            return Ok(Value::String(entity.entity_type().as_str().to_string()));
        }

        let raw = if column.is_foreign_key_shadow {
            let Some(related) = column.related.as_ref() else {
                bail!(
                    ErrorKind::SchemaResolution,
                    "Foreign-key shadow column has no related-key resolution",
                    detail = format!("column {}", column.column_name)
                );
            };
            entity
                .related_key(&related.navigation, &related.key_property)
                .unwrap_or(Value::Null)
        } else if column.is_shadow {
            self.shadow_value(entity, column)
        } else {
            extract_path(entity, &column.path)?
        };

        self.convert(raw, column)
    }

    /// Resolves a plain shadow property value.
    fn shadow_value(&self, entity: &dyn Entity, column: &ColumnDescriptor) -> Value {
        if self.config.dynamic_shadow_values
            && let Some(resolver) = self.shadow_resolver
        {
            return resolver(entity, column.path.leaf());
        }

        // Shadow properties have no settable field; an entity may still
        // expose the tracked value through its accessor.
        match entity.get(column.path.leaf()) {
            Some(Field::Scalar(value)) => value,
            _ => Value::Null,
        }
    }

    /// Applies rounding, conversion, and provider encodings in order.
    fn convert(&self, value: Value, column: &ColumnDescriptor) -> BulkResult<Value> {
        if value.is_null() {
            // A null JSON object yields SQL NULL, never the string "null".
            return Ok(Value::Null);
        }

        let value = self.round_temporal(value, column);

        let value = match &column.converter {
            Some(converter) => (converter.to_provider)(value)?,
            None => value,
        };

        if column.is_spatial {
            return self.encode_spatial(value, column);
        }

        if column.is_hierarchical {
            return encode_hierarchical(value, column);
        }

        if column.is_json {
            return serialize_json(value);
        }

        Ok(value)
    }

    fn round_temporal(&self, value: Value, column: &ColumnDescriptor) -> Value {
        let Some(declared) = column.declared_precision else {
            return value;
        };
        if declared >= self.config.datetime_max_precision {
            return value;
        }

        match value {
            Value::Timestamp(ts) => Value::Timestamp(temporal::round_timestamp(ts, declared)),
            Value::TimestampTz(ts) => {
                Value::TimestampTz(temporal::round_timestamp_tz(ts, declared))
            }
            Value::Time(t) => Value::Time(temporal::round_time(t, declared)),
            other => other,
        }
    }

    fn encode_spatial(&self, value: Value, column: &ColumnDescriptor) -> BulkResult<Value> {
        let kind = column.spatial_kind.unwrap_or(SpatialKind::Geometry);

        match value {
            Value::Bytes(wkb) => Ok(Value::Bytes(spatial::encode(kind, self.config.srid, &wkb))),
            other => bail!(
                ErrorKind::ConversionError,
                "Spatial column expects a WKB byte payload",
                detail = format!(
                    "column {}, got {:?}",
                    column.column_name,
                    other.storage_type()
                )
            ),
        }
    }
}

fn encode_hierarchical(value: Value, column: &ColumnDescriptor) -> BulkResult<Value> {
    match value {
        Value::String(path) => Ok(Value::Bytes(hierarchy::encode_path(&path)?)),
        // Already provider-encoded.
        Value::Bytes(bytes) => Ok(Value::Bytes(bytes)),
        other => bail!(
            ErrorKind::ConversionError,
            "Hierarchical column expects a textual materialized path",
            detail = format!(
                "column {}, got {:?}",
                column.column_name,
                other.storage_type()
            )
        ),
    }
}

fn serialize_json(value: Value) -> BulkResult<Value> {
    match value {
        Value::Json(serde_json::Value::Null) => Ok(Value::Null),
        Value::Json(json) => Ok(Value::String(serde_json::to_string(&json)?)),
        Value::String(text) => Ok(Value::String(text)),
        other => bail!(
            ErrorKind::ConversionError,
            "JSON-mapped column expects a JSON value",
            detail = format!("got {:?}", other.storage_type())
        ),
    }
}

/// Walks a property path through nested owned entities.
///
/// A null owned object short-circuits to [`Value::Null`] for every descendant
/// column. An unknown property or a path continuing through a scalar fails
/// with [`ErrorKind::SchemaResolution`].
pub(crate) fn extract_path(entity: &dyn Entity, path: &PropertyPath) -> BulkResult<Value> {
    let segments = path.segments();
    let mut current: &dyn Entity = entity;

    for (index, segment) in segments.iter().enumerate() {
        let is_leaf = index + 1 == segments.len();

        match current.get(segment) {
            None => bail!(
                ErrorKind::SchemaResolution,
                "Property path does not resolve on the entity",
                detail = format!("path {path}, type {}", current.entity_type())
            ),
            Some(Field::Scalar(value)) => {
                if is_leaf {
                    return Ok(value);
                }
                bail!(
                    ErrorKind::SchemaResolution,
                    "Property path continues through a scalar field",
                    detail = format!("path {path}, segment {segment}")
                );
            }
            Some(Field::Owned(None)) => return Ok(Value::Null),
            Some(Field::Owned(Some(owned))) => {
                if is_leaf {
                    bail!(
                        ErrorKind::SchemaResolution,
                        "Property path ends on an owned object instead of a scalar field",
                        detail = format!("path {path}")
                    );
                }
                current = owned;
            }
        }
    }

    unreachable!("paths have at least one segment")
}
