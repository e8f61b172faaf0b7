//! Operation kinds driven by the orchestrator.

/// The kind of bulk operation being executed.
///
/// The operation kind selects the orchestrator's statement sequence and feeds
/// into schema derivation: server-defaulted columns are omitted on plain
/// inserts, and delete semantics force output-table columns nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Straight bulk insert into the target (or staging) table.
    Insert,
    /// Upsert by join against a staging table.
    InsertOrUpdate,
    /// Upsert plus delete-by-join for target rows absent from the staging table.
    InsertOrUpdateOrDelete,
    /// Delete-by-join only.
    Delete,
    /// Join-select between staging and target, reconciled into the caller's entities.
    Read,
    /// Single truncate statement, no staging lifecycle.
    Truncate,
}

impl OperationKind {
    /// Returns whether this operation runs the staged merge protocol.
    pub fn is_merge(&self) -> bool {
        matches!(
            self,
            OperationKind::InsertOrUpdate
                | OperationKind::InsertOrUpdateOrDelete
                | OperationKind::Delete
        )
    }

    /// Returns whether delete results can appear in the output table.
    ///
    /// Delete-result rows carry NULL for every non-key column, which is why
    /// the temp output table is created with all columns forced nullable
    /// whenever delete semantics are in play.
    pub fn has_delete_semantics(&self) -> bool {
        matches!(
            self,
            OperationKind::InsertOrUpdateOrDelete | OperationKind::Delete
        )
    }

    /// Returns whether the operation materializes and transfers rows.
    pub fn transfers_rows(&self) -> bool {
        !matches!(self, OperationKind::Truncate)
    }
}
