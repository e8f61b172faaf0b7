//! Discriminator column detection strategies.
//!
//! Type-hierarchy tables carry a discriminator column telling rows of
//! different concrete types apart. The compatibility heuristic assumes the
//! first textual shadow column is the discriminator; that imprecision is
//! isolated behind [`DiscriminatorStrategy`] so callers can swap in an
//! explicit declaration instead.

use crate::schema::descriptor::ColumnDescriptor;

/// Picks the discriminator column, if any, from a derived column set.
pub trait DiscriminatorStrategy: Send + Sync {
    /// Returns the destination column name of the discriminator.
    fn detect(&self, columns: &[ColumnDescriptor]) -> Option<String>;
}

/// Compatibility heuristic: the first shadow column with a textual storage
/// type is assumed to be the discriminator.
///
/// Known imprecision: an unrelated textual shadow column declared before the
/// real discriminator gets picked instead. Prefer [`ExplicitColumn`] where
/// the model is known.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstTextualShadowColumn;

impl DiscriminatorStrategy for FirstTextualShadowColumn {
    fn detect(&self, columns: &[ColumnDescriptor]) -> Option<String> {
        columns
            .iter()
            .find(|c| c.is_shadow && !c.is_foreign_key_shadow && c.storage_type.is_textual())
            .map(|c| c.column_name.clone())
    }
}

/// Explicitly declared discriminator column.
#[derive(Debug, Clone)]
pub struct ExplicitColumn(pub String);

impl DiscriminatorStrategy for ExplicitColumn {
    fn detect(&self, columns: &[ColumnDescriptor]) -> Option<String> {
        columns
            .iter()
            .find(|c| c.column_name == self.0)
            .map(|c| c.column_name.clone())
    }
}
