//! The entity schema provider collaborator and its snapshot cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::conversions::spatial::SpatialKind;
use crate::entity::EntityType;
use crate::error::BulkResult;
use crate::schema::descriptor::ValueConverter;
use crate::types::StorageType;

/// Classification of one reflectable property of a domain type.
///
/// Every property classifies into exactly one kind; the schema builder maps
/// kinds to flattening behavior.
#[derive(Debug, Clone)]
pub enum PropertyKind {
    /// Regular mapped property backed by a settable field.
    Scalar,
    /// Schema-level column with no settable field on the domain object.
    Shadow,
    /// A property that only exists to carry a related entity's key.
    ShadowForeignKey {
        /// Navigation property on the owning entity.
        navigation: String,
        /// Key property on the related entity.
        key_property: String,
    },
    /// A nested owned object whose scalar fields flatten into prefixed columns.
    Owned {
        /// The owned object's own entity type.
        entity_type: EntityType,
    },
    /// A property serialized as a single JSON text column.
    Json,
    /// A lazy or virtual reference that is neither owned nor an FK shadow.
    ///
    /// Never dereferenced, so no implicit load can be triggered.
    Navigation,
}

/// Metadata for one property as reported by the entity schema provider.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name on the domain object.
    pub name: String,
    /// Mapped column name (unprefixed; owned flattening adds prefixes).
    pub column_name: String,
    /// Property classification.
    pub kind: PropertyKind,
    /// Natural storage type before narrowing and conversion.
    pub storage_type: StorageType,
    /// Whether the mapped column accepts NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub is_key: bool,
    /// Whether the column is a server-generated identity column.
    pub is_identity: bool,
    /// Whether the property holds a spatial geometry value.
    pub is_spatial: bool,
    /// Geography vs geometry subtype for spatial properties.
    pub spatial_kind: Option<SpatialKind>,
    /// Whether the property holds a hierarchical path value.
    pub is_hierarchical: bool,
    /// Whether the column is a concurrency token.
    pub is_concurrency_token: bool,
    /// Whether the server assigns a default when the column is omitted on insert.
    pub has_server_default: bool,
    /// Declared sub-second precision for temporal columns, in decimal digits.
    pub declared_precision: Option<u8>,
    /// Optional registered domain-to-provider conversion.
    pub converter: Option<ValueConverter>,
}

impl PropertyDescriptor {
    /// Creates a plain scalar descriptor; the classification flags default to
    /// off and can be set individually.
    pub fn scalar(
        name: impl Into<String>,
        column_name: impl Into<String>,
        storage_type: StorageType,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            kind: PropertyKind::Scalar,
            storage_type,
            nullable,
            is_key: false,
            is_identity: false,
            is_spatial: false,
            spatial_kind: None,
            is_hierarchical: false,
            is_concurrency_token: false,
            has_server_default: false,
            declared_precision: None,
            converter: None,
        }
    }
}

/// Source of entity metadata.
///
/// Given a domain type, yields the property descriptors the schema builder
/// flattens into a [`crate::schema::TableSchema`]. Implementations are pure
/// metadata lookups; the pipeline snapshots their output per call.
pub trait EntitySchemaProvider: Send + Sync {
    /// Returns the reflectable properties of the given domain type.
    ///
    /// Fails with [`crate::error::ErrorKind::SchemaResolution`] when the type
    /// is unknown.
    fn columns(&self, entity_type: EntityType) -> BulkResult<Vec<PropertyDescriptor>>;
}

/// Process-lifetime cache of provider snapshots keyed by entity type.
///
/// Descriptor sets are immutable once built, so the cache hands out shared
/// [`Arc`] snapshots and is safe for concurrent read-mostly use. This
/// replaces per-row reflection: the accessor set for a domain type is built
/// once and reused for every subsequent operation on that type.
pub struct SchemaProviderCache<P> {
    provider: P,
    snapshots: RwLock<HashMap<EntityType, Arc<Vec<PropertyDescriptor>>>>,
}

impl<P: EntitySchemaProvider> SchemaProviderCache<P> {
    /// Wraps a provider with a snapshot cache.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached descriptor snapshot for the given type, consulting
    /// the wrapped provider on first use.
    pub fn snapshot(&self, entity_type: EntityType) -> BulkResult<Arc<Vec<PropertyDescriptor>>> {
        {
            let snapshots = self.snapshots.read().expect("snapshot lock poisoned");
            if let Some(snapshot) = snapshots.get(&entity_type) {
                return Ok(Arc::clone(snapshot));
            }
        }

        let snapshot = Arc::new(self.provider.columns(entity_type)?);

        let mut snapshots = self.snapshots.write().expect("snapshot lock poisoned");
        // A racing caller may have inserted meanwhile; keep the first snapshot.
        let entry = snapshots
            .entry(entity_type)
            .or_insert_with(|| Arc::clone(&snapshot));

        Ok(Arc::clone(entry))
    }
}

impl<P: EntitySchemaProvider> EntitySchemaProvider for SchemaProviderCache<P> {
    fn columns(&self, entity_type: EntityType) -> BulkResult<Vec<PropertyDescriptor>> {
        self.snapshot(entity_type).map(|snapshot| (*snapshot).clone())
    }
}
