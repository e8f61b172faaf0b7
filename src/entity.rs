//! Typed field access over domain objects.
//!
//! The bulk pipeline never reflects over domain objects at row time. Instead,
//! every participating object implements [`Entity`], a small trait exposing
//! fields by name as either scalar values or nested owned entities. The
//! materializer walks property paths through this trait, and reconciliation
//! writes server-generated values back through it.

use std::fmt;

use crate::error::BulkResult;
use crate::types::Value;

/// Identifies a concrete domain type.
///
/// The wrapped name doubles as the discriminator value stamped into the
/// detected discriminator column for type-hierarchy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(&'static str);

impl EntityType {
    /// Creates an [`EntityType`] from a static type name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the underlying type name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One field of an entity, as seen by the materializer.
pub enum Field<'a> {
    /// A scalar value, already lifted into the pipeline's value model.
    Scalar(Value),
    /// An owned nested entity, or [`None`] when the nested object is null.
    ///
    /// A null owned object yields [`Value::Null`] for every descendant column
    /// during materialization.
    Owned(Option<&'a dyn Entity>),
}

/// Typed field access for one domain object.
///
/// Implementations are plain hand-written (or generated) accessors; no
/// per-row reflection is involved. Lazy or virtual references that are
/// neither owned nor foreign-key shadows must not be reachable through
/// [`Entity::get`], so the pipeline can never trigger an implicit load.
pub trait Entity: Send + Sync {
    /// Returns the concrete runtime type of this object.
    fn entity_type(&self) -> EntityType;

    /// Returns the named field, or [`None`] when the property is unknown.
    fn get(&self, property: &str) -> Option<Field<'_>>;

    /// Writes a scalar value back into the named field.
    ///
    /// Used by output reconciliation to push server-generated values (keys,
    /// computed columns, concurrency tokens) into the caller's objects.
    fn set(&mut self, property: &str, value: Value) -> BulkResult<()>;

    /// Returns mutable access to a nested owned entity, or [`None`] when the
    /// property is unknown or the nested object is null.
    fn owned_mut(&mut self, property: &str) -> Option<&mut dyn Entity>;

    /// Resolves the key of a related entity for a foreign-key shadow column.
    ///
    /// Shadow FK values are obtained by following the related object's key
    /// property rather than the owning object's own state, because such
    /// properties have no settable field. Returns [`None`] when the
    /// navigation is not loaded, which materializes as SQL NULL.
    fn related_key(&self, navigation: &str, key_property: &str) -> Option<Value> {
        let _ = (navigation, key_property);
        None
    }
}
