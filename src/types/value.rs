//! Typed column values and their storage-side types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// A single column value on its way to the destination table.
///
/// [`Value`] is the post-extraction, pre-transfer representation of one cell.
/// Values are positionally aligned to the columns of a
/// [`crate::schema::TableSchema`] and carry proper type information so the
/// bulk writer collaborator can bind them without re-inspecting the schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    /// Returns whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the storage type this value naturally binds to.
    ///
    /// [`Value::Null`] has no natural storage type and returns [`None`].
    pub fn storage_type(&self) -> Option<StorageType> {
        let storage_type = match self {
            Value::Null => return None,
            Value::Bool(_) => StorageType::Bool,
            Value::I16(_) => StorageType::I16,
            Value::I32(_) => StorageType::I32,
            Value::I64(_) => StorageType::I64,
            Value::F32(_) => StorageType::F32,
            Value::F64(_) => StorageType::F64,
            Value::String(_) => StorageType::Text,
            Value::Bytes(_) => StorageType::Bytes,
            Value::Date(_) => StorageType::Date,
            Value::Time(_) => StorageType::Time,
            Value::Timestamp(_) => StorageType::Timestamp,
            Value::TimestampTz(_) => StorageType::TimestampTz,
            Value::Uuid(_) => StorageType::Uuid,
            Value::Json(_) => StorageType::Json,
        };

        Some(storage_type)
    }
}

/// The storage-side type of a column, after all narrowing and conversion.
///
/// This is the type the destination column is written with: nullable wrappers
/// have been unwrapped, spatial and hierarchical values have narrowed to
/// [`StorageType::Bytes`], JSON-mapped properties to [`StorageType::Text`],
/// and a registered value converter has substituted its provider-side type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
}

impl StorageType {
    /// Returns whether this storage type holds textual data.
    ///
    /// Used by the discriminator detection heuristic, which only considers
    /// textual shadow columns as discriminator candidates.
    pub fn is_textual(&self) -> bool {
        matches!(self, StorageType::Text | StorageType::Json)
    }

    /// Returns whether this storage type carries sub-second precision.
    pub fn is_sub_second_temporal(&self) -> bool {
        matches!(
            self,
            StorageType::Time | StorageType::Timestamp | StorageType::TimestampTz
        )
    }
}
