//! A small order/address/customer domain model used across the test suites.
//!
//! Exercises every property classification: keys and identity, server
//! defaults, a concurrency token, a value converter, JSON, spatial and
//! hierarchical properties, an owned nested object, a navigation with a
//! foreign-key shadow, and plain shadow properties.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::bulk_error;
use crate::conversions::hierarchy;
use crate::conversions::spatial::SpatialKind;
use crate::entity::{Entity, EntityType, Field};
use crate::error::{BulkResult, ErrorKind};
use crate::schema::{PropertyDescriptor, PropertyKind, ValueConverter};
use crate::types::{StorageType, Value};

pub const ORDER_TYPE: EntityType = EntityType::new("order");
pub const ADDRESS_TYPE: EntityType = EntityType::new("address");
pub const CUSTOMER_TYPE: EntityType = EntityType::new("customer");

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub name: String,
    /// Domain-side status code; converted to its textual provider value.
    pub status: i32,
    pub placed_at: NaiveDateTime,
    pub created_at: DateTime<Utc>,
    pub row_version: Vec<u8>,
    pub metadata: serde_json::Value,
    /// Well-known-binary point payload, pre-encoding.
    pub location: Option<Vec<u8>>,
    pub node_path: Option<String>,
    pub shipping: Option<Address>,
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub city: String,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
}

/// A representative order. The linked customer's id is `100 + id` so tests
/// can assert foreign-key shadow resolution.
pub fn sample_order(id: i64) -> Order {
    Order {
        id,
        name: format!("order-{id}"),
        status: 0,
        placed_at: NaiveDate::from_ymd_opt(2024, 5, 20)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap_or_default(),
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 20, 9, 30, 0)
            .single()
            .unwrap_or_default(),
        row_version: vec![0, 0, 0, 1],
        metadata: serde_json::json!({ "priority": id }),
        location: Some(sample_point_wkb()),
        node_path: Some("/1/2/".to_string()),
        shipping: Some(Address {
            city: "Lisbon".to_string(),
            zip: Some("1000".to_string()),
        }),
        customer: Some(Customer {
            id: 100 + id,
            name: format!("customer-{id}"),
        }),
    }
}

/// A little-endian WKB point, as a geometry library would hand it over.
pub fn sample_point_wkb() -> Vec<u8> {
    let mut wkb = vec![0x01, 0x01, 0x00, 0x00, 0x00];
    wkb.extend_from_slice(&38.7223_f64.to_le_bytes());
    wkb.extend_from_slice(&(-9.1393_f64).to_le_bytes());
    wkb
}

fn status_converter() -> ValueConverter {
    ValueConverter {
        provider_type: StorageType::Text,
        to_provider: Arc::new(|value| match value {
            Value::I32(0) => Ok(Value::String("pending".to_string())),
            Value::I32(1) => Ok(Value::String("shipped".to_string())),
            other => Err(bulk_error!(
                ErrorKind::ConversionError,
                "Unknown status code",
                detail = format!("{other:?}")
            )),
        }),
        from_provider: Arc::new(|value| match value {
            Value::String(s) if s == "pending" => Ok(Value::I32(0)),
            Value::String(s) if s == "shipped" => Ok(Value::I32(1)),
            other => Err(bulk_error!(
                ErrorKind::ConversionError,
                "Unknown status text",
                detail = format!("{other:?}")
            )),
        }),
    }
}

pub fn order_descriptors() -> Vec<PropertyDescriptor> {
    let mut id = PropertyDescriptor::scalar("id", "id", StorageType::I64, false);
    id.is_key = true;
    id.is_identity = true;

    let name = PropertyDescriptor::scalar("name", "name", StorageType::Text, false);

    let mut status = PropertyDescriptor::scalar("status", "status", StorageType::I32, false);
    status.converter = Some(status_converter());

    let mut placed_at =
        PropertyDescriptor::scalar("placed_at", "placed_at", StorageType::Timestamp, false);
    placed_at.declared_precision = Some(3);

    let mut created_at =
        PropertyDescriptor::scalar("created_at", "created_at", StorageType::TimestampTz, false);
    created_at.has_server_default = true;

    let mut row_version =
        PropertyDescriptor::scalar("row_version", "row_version", StorageType::Bytes, false);
    row_version.is_concurrency_token = true;

    let mut metadata = PropertyDescriptor::scalar("metadata", "metadata", StorageType::Json, true);
    metadata.kind = PropertyKind::Json;

    let mut location = PropertyDescriptor::scalar("location", "location", StorageType::Bytes, true);
    location.is_spatial = true;
    location.spatial_kind = Some(SpatialKind::Geography);

    let mut node_path = PropertyDescriptor::scalar("node_path", "node_path", StorageType::Text, true);
    node_path.is_hierarchical = true;

    let mut shipping = PropertyDescriptor::scalar("shipping", "shipping", StorageType::Text, true);
    shipping.kind = PropertyKind::Owned {
        entity_type: ADDRESS_TYPE,
    };

    let mut customer = PropertyDescriptor::scalar("customer", "customer", StorageType::Text, true);
    customer.kind = PropertyKind::Navigation;

    let mut customer_id =
        PropertyDescriptor::scalar("customer_id", "customer_id", StorageType::I64, true);
    customer_id.kind = PropertyKind::ShadowForeignKey {
        navigation: "customer".to_string(),
        key_property: "id".to_string(),
    };

    let mut entity_kind =
        PropertyDescriptor::scalar("entity_kind", "entity_kind", StorageType::Text, true);
    entity_kind.kind = PropertyKind::Shadow;

    let mut tenant = PropertyDescriptor::scalar("tenant", "tenant", StorageType::Text, true);
    tenant.kind = PropertyKind::Shadow;

    vec![
        id, name, status, placed_at, created_at, row_version, metadata, location, node_path,
        shipping, customer, customer_id, entity_kind, tenant,
    ]
}

pub fn address_descriptors() -> Vec<PropertyDescriptor> {
    vec![
        PropertyDescriptor::scalar("city", "city", StorageType::Text, false),
        PropertyDescriptor::scalar("zip", "zip", StorageType::Text, true),
    ]
}

pub fn customer_descriptors() -> Vec<PropertyDescriptor> {
    let mut id = PropertyDescriptor::scalar("id", "id", StorageType::I64, false);
    id.is_key = true;

    vec![
        id,
        PropertyDescriptor::scalar("name", "name", StorageType::Text, false),
    ]
}

fn type_mismatch(property: &str, value: &Value) -> crate::error::BulkError {
    bulk_error!(
        ErrorKind::ConversionError,
        "Value does not fit the target field",
        detail = format!("property {property}, value {value:?}")
    )
}

impl Entity for Order {
    fn entity_type(&self) -> EntityType {
        ORDER_TYPE
    }

    fn get(&self, property: &str) -> Option<Field<'_>> {
        let field = match property {
            "id" => Field::Scalar(Value::I64(self.id)),
            "name" => Field::Scalar(Value::String(self.name.clone())),
            "status" => Field::Scalar(Value::I32(self.status)),
            "placed_at" => Field::Scalar(Value::Timestamp(self.placed_at)),
            "created_at" => Field::Scalar(Value::TimestampTz(self.created_at)),
            "row_version" => Field::Scalar(Value::Bytes(self.row_version.clone())),
            "metadata" => Field::Scalar(Value::Json(self.metadata.clone())),
            "location" => Field::Scalar(
                self.location
                    .clone()
                    .map(Value::Bytes)
                    .unwrap_or(Value::Null),
            ),
            "node_path" => Field::Scalar(
                self.node_path
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ),
            "shipping" => Field::Owned(self.shipping.as_ref().map(|a| a as &dyn Entity)),
            _ => return None,
        };

        Some(field)
    }

    fn set(&mut self, property: &str, value: Value) -> BulkResult<()> {
        match (property, value) {
            ("id", Value::I64(v)) => self.id = v,
            ("name", Value::String(v)) => self.name = v,
            ("status", Value::I32(v)) => self.status = v,
            ("placed_at", Value::Timestamp(v)) => self.placed_at = v,
            ("created_at", Value::TimestampTz(v)) => self.created_at = v,
            ("row_version", Value::Bytes(v)) => self.row_version = v,
            ("metadata", Value::Json(v)) => self.metadata = v,
            ("metadata", Value::String(text)) => self.metadata = serde_json::from_str(&text)?,
            ("metadata", Value::Null) => self.metadata = serde_json::Value::Null,
            ("location", Value::Bytes(v)) => self.location = Some(v),
            ("location", Value::Null) => self.location = None,
            ("node_path", Value::String(v)) => self.node_path = Some(v),
            ("node_path", Value::Bytes(v)) => self.node_path = Some(hierarchy::decode_path(&v)?),
            ("node_path", Value::Null) => self.node_path = None,
            (property, value) => return Err(type_mismatch(property, &value)),
        }

        Ok(())
    }

    fn owned_mut(&mut self, property: &str) -> Option<&mut dyn Entity> {
        match property {
            "shipping" => self.shipping.as_mut().map(|a| a as &mut dyn Entity),
            _ => None,
        }
    }

    fn related_key(&self, navigation: &str, key_property: &str) -> Option<Value> {
        match (navigation, key_property) {
            ("customer", "id") => self.customer.as_ref().map(|c| Value::I64(c.id)),
            _ => None,
        }
    }
}

impl Entity for Address {
    fn entity_type(&self) -> EntityType {
        ADDRESS_TYPE
    }

    fn get(&self, property: &str) -> Option<Field<'_>> {
        let field = match property {
            "city" => Field::Scalar(Value::String(self.city.clone())),
            "zip" => Field::Scalar(self.zip.clone().map(Value::String).unwrap_or(Value::Null)),
            _ => return None,
        };

        Some(field)
    }

    fn set(&mut self, property: &str, value: Value) -> BulkResult<()> {
        match (property, value) {
            ("city", Value::String(v)) => self.city = v,
            ("zip", Value::String(v)) => self.zip = Some(v),
            ("zip", Value::Null) => self.zip = None,
            (property, value) => return Err(type_mismatch(property, &value)),
        }

        Ok(())
    }

    fn owned_mut(&mut self, _property: &str) -> Option<&mut dyn Entity> {
        None
    }
}

impl Entity for Customer {
    fn entity_type(&self) -> EntityType {
        CUSTOMER_TYPE
    }

    fn get(&self, property: &str) -> Option<Field<'_>> {
        let field = match property {
            "id" => Field::Scalar(Value::I64(self.id)),
            "name" => Field::Scalar(Value::String(self.name.clone())),
            _ => return None,
        };

        Some(field)
    }

    fn set(&mut self, property: &str, value: Value) -> BulkResult<()> {
        match (property, value) {
            ("id", Value::I64(v)) => self.id = v,
            ("name", Value::String(v)) => self.name = v,
            (property, value) => return Err(type_mismatch(property, &value)),
        }

        Ok(())
    }

    fn owned_mut(&mut self, _property: &str) -> Option<&mut dyn Entity> {
        None
    }
}
