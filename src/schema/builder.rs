//! Derivation of the flat column schema for one operation.

use std::collections::HashSet;

use crate::bail;
use crate::config::BulkConfig;
use crate::entity::EntityType;
use crate::error::{BulkResult, ErrorKind};
use crate::schema::descriptor::{
    ColumnDescriptor, PropertyPath, RelatedKey, TableName, TableSchema,
};
use crate::schema::discriminator::{DiscriminatorStrategy, FirstTextualShadowColumn};
use crate::schema::provider::{EntitySchemaProvider, PropertyDescriptor, PropertyKind};
use crate::types::{OperationKind, StorageType};

/// Owned navigations deeper than this indicate a cyclic model.
const MAX_OWNED_DEPTH: usize = 16;

static DEFAULT_DISCRIMINATOR_STRATEGY: FirstTextualShadowColumn = FirstTextualShadowColumn;

/// Derives, once per operation, the ordered set of target columns and how to
/// extract a value for each from a domain object.
///
/// `build` is deterministic and performs no I/O; the same inputs always
/// produce the same schema.
pub struct ColumnSchemaBuilder<'a> {
    provider: &'a dyn EntitySchemaProvider,
    discriminator: &'a dyn DiscriminatorStrategy,
}

impl<'a> ColumnSchemaBuilder<'a> {
    /// Creates a builder using the compatibility discriminator heuristic.
    pub fn new(provider: &'a dyn EntitySchemaProvider) -> Self {
        Self {
            provider,
            discriminator: &DEFAULT_DISCRIMINATOR_STRATEGY,
        }
    }

    /// Creates a builder with an explicit discriminator strategy.
    pub fn with_strategy(
        provider: &'a dyn EntitySchemaProvider,
        discriminator: &'a dyn DiscriminatorStrategy,
    ) -> Self {
        Self {
            provider,
            discriminator,
        }
    }

    /// Builds the schema for one operation on the given domain type.
    ///
    /// Flattens owned navigations recursively, gates shadow properties on
    /// configuration, applies the per-operation omission rules, and fails
    /// fast on configuration conflicts before any database work happens.
    pub fn build(
        &self,
        table: TableName,
        entity_type: EntityType,
        operation: OperationKind,
        config: &BulkConfig,
    ) -> BulkResult<TableSchema> {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();

        self.collect(
            entity_type,
            "",
            None,
            false,
            0,
            operation,
            config,
            &mut columns,
            &mut seen,
        )?;

        let mut schema = TableSchema::new(table, columns)?;

        if config.enable_shadow_properties
            && let Some(discriminator) = self.discriminator.detect(schema.columns())
        {
            schema.mark_discriminator(&discriminator);
        }

        Ok(schema)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect(
        &self,
        entity_type: EntityType,
        column_prefix: &str,
        base_path: Option<&PropertyPath>,
        force_nullable: bool,
        depth: usize,
        operation: OperationKind,
        config: &BulkConfig,
        columns: &mut Vec<ColumnDescriptor>,
        seen: &mut HashSet<PropertyPath>,
    ) -> BulkResult<()> {
        if depth > MAX_OWNED_DEPTH {
            bail!(
                ErrorKind::SchemaResolution,
                "Owned navigation nesting exceeds the supported depth",
                detail = format!("type {entity_type}, depth {depth}")
            );
        }

        let descriptors = self.provider.columns(entity_type)?;

        for descriptor in &descriptors {
            let path = match base_path {
                Some(base) => base.child(&descriptor.name),
                None => PropertyPath::root(&descriptor.name),
            };

            // First writer wins: a property already mapped is never re-added.
            if seen.contains(&path) {
                continue;
            }

            match &descriptor.kind {
                PropertyKind::Navigation => continue,
                PropertyKind::Owned {
                    entity_type: owned_type,
                } => {
                    let nested_prefix = format!("{column_prefix}{}_", descriptor.column_name);
                    self.collect(
                        *owned_type,
                        &nested_prefix,
                        Some(&path),
                        force_nullable || descriptor.nullable,
                        depth + 1,
                        operation,
                        config,
                        columns,
                        seen,
                    )?;
                }
                kind => {
                    if let Some(column) = self.classify(
                        descriptor,
                        kind,
                        path.clone(),
                        column_prefix,
                        force_nullable,
                        operation,
                        config,
                    )? {
                        seen.insert(path);
                        columns.push(column);
                    }
                }
            }
        }

        Ok(())
    }

    /// Turns one leaf property descriptor into a column, or [`None`] when the
    /// omission rules exclude it.
    fn classify(
        &self,
        descriptor: &PropertyDescriptor,
        kind: &PropertyKind,
        path: PropertyPath,
        column_prefix: &str,
        force_nullable: bool,
        operation: OperationKind,
        config: &BulkConfig,
    ) -> BulkResult<Option<ColumnDescriptor>> {
        if (descriptor.is_spatial || descriptor.is_hierarchical)
            && config.compare_columns.is_some()
        {
            bail!(
                ErrorKind::ConfigConflict,
                "Spatial and hierarchical columns cannot be combined with an explicit compare-column list",
                detail = format!("column {}", descriptor.column_name)
            );
        }

        let (is_shadow, is_foreign_key_shadow, related) = match kind {
            PropertyKind::Shadow => {
                if !config.enable_shadow_properties {
                    return Ok(None);
                }
                (true, false, None)
            }
            PropertyKind::ShadowForeignKey {
                navigation,
                key_property,
            } => (
                true,
                true,
                Some(RelatedKey {
                    navigation: navigation.clone(),
                    key_property: key_property.clone(),
                }),
            ),
            _ => (false, false, None),
        };

        let is_json = matches!(kind, PropertyKind::Json);

        // Literal port of the concurrency-token rule: the token column is
        // included unless the omit flag is explicitly set.
        if descriptor.is_concurrency_token && config.omit_unchanged_concurrency_token {
            return Ok(None);
        }

        // Server-assigned columns are skipped on a plain insert without
        // output capture; there is nothing to send and nothing to read back.
        if operation == OperationKind::Insert
            && !config.use_output_table
            && (descriptor.has_server_default || (descriptor.is_identity && !config.keep_identity))
        {
            return Ok(None);
        }

        // Type narrowing: provider-side converter type wins, then the byte
        // narrowing for spatial/hierarchical values, then JSON text.
        let storage_type = if let Some(converter) = &descriptor.converter {
            converter.provider_type
        } else if descriptor.is_spatial || descriptor.is_hierarchical {
            StorageType::Bytes
        } else if is_json {
            StorageType::Text
        } else {
            descriptor.storage_type
        };

        Ok(Some(ColumnDescriptor {
            path,
            column_name: format!("{column_prefix}{}", descriptor.column_name),
            storage_type,
            nullable: descriptor.nullable || force_nullable,
            is_key: descriptor.is_key,
            is_identity: descriptor.is_identity,
            is_shadow,
            is_foreign_key_shadow,
            is_json,
            is_spatial: descriptor.is_spatial,
            is_hierarchical: descriptor.is_hierarchical,
            is_discriminator: false,
            is_concurrency_token: descriptor.is_concurrency_token,
            has_server_default_on_insert: descriptor.has_server_default,
            declared_precision: descriptor.declared_precision,
            spatial_kind: descriptor.spatial_kind,
            related,
            converter: descriptor.converter.clone(),
        }))
    }
}
