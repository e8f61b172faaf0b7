//! An in-memory entity schema provider backed by a hash map.

use std::collections::HashMap;

use crate::bulk_error;
use crate::entity::EntityType;
use crate::error::{BulkResult, ErrorKind};
use crate::schema::{EntitySchemaProvider, PropertyDescriptor};
use crate::test_utils::sample;

/// Hash-map-backed [`EntitySchemaProvider`] for tests.
#[derive(Default)]
pub struct MapSchemaProvider {
    descriptors: HashMap<EntityType, Vec<PropertyDescriptor>>,
}

impl MapSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider preloaded with the sample order/address/customer
    /// model.
    pub fn with_sample_model() -> Self {
        let mut provider = Self::new();
        provider.register(sample::ORDER_TYPE, sample::order_descriptors());
        provider.register(sample::ADDRESS_TYPE, sample::address_descriptors());
        provider.register(sample::CUSTOMER_TYPE, sample::customer_descriptors());
        provider
    }

    /// Registers (or replaces) the descriptors for a type.
    pub fn register(&mut self, entity_type: EntityType, descriptors: Vec<PropertyDescriptor>) {
        self.descriptors.insert(entity_type, descriptors);
    }
}

impl EntitySchemaProvider for MapSchemaProvider {
    fn columns(&self, entity_type: EntityType) -> BulkResult<Vec<PropertyDescriptor>> {
        self.descriptors.get(&entity_type).cloned().ok_or_else(|| {
            bulk_error!(
                ErrorKind::SchemaResolution,
                "Unknown entity type",
                detail = entity_type.to_string()
            )
        })
    }
}
