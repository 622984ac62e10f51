//! Revision Store Port
//!
//! The metadata store is a passive data holder: it answers queries and
//! applies row changes inside a transaction, but the ordering rules
//! (dedup, numbering, single active row) belong to the engine.

use super::models::{
    DocumentFilter, DocumentId, DocumentSummary, Lineage, MachineDocument,
    MachineDocumentSummary, NewMachineDocument, NewRevision, RegistryFilter, Revision,
    RevisionId,
};
use crate::error::Result;

/// Revision metadata store
///
/// Calls block; async callers run them on the blocking pool.
pub trait RevisionStore: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Transactions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Open an exclusive write transaction
    ///
    /// Writers are serialised for the lifetime of the returned handle,
    /// including writers in other processes sharing the database.
    /// Dropping the handle without `commit` rolls back.
    fn begin(&self) -> Result<Box<dyn RevisionTx + '_>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Revision queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// All revisions of a lineage, newest number first
    fn list_revisions(&self, lineage: &Lineage) -> Result<Vec<Revision>>;

    fn get_active(&self, lineage: &Lineage) -> Result<Option<Revision>>;

    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>>;

    /// One row per keyed lineage matching the filter
    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentSummary>>;

    /// `(revision id, stored path)` for every row, for reconciliation
    fn stored_paths(&self) -> Result<Vec<(RevisionId, String)>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Registry queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn get_document(&self, id: DocumentId) -> Result<Option<MachineDocument>>;

    fn list_machine_documents(&self, filter: &RegistryFilter)
        -> Result<Vec<MachineDocumentSummary>>;

    /// Active document in the same line/machine/type whose name matches
    /// case-insensitively, or one of whose revisions has `content_hash`
    fn find_machine_document(
        &self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        content_hash: &str,
    ) -> Result<Option<MachineDocument>>;
}

/// Write transaction over the revision store
pub trait RevisionTx {
    /// All revisions of a lineage, newest number first
    fn revisions(&mut self, lineage: &Lineage) -> Result<Vec<Revision>>;

    fn get_revision(&mut self, id: RevisionId) -> Result<Option<Revision>>;

    /// Clear the active flag on every revision of the lineage
    ///
    /// Returns the number of rows that were active.
    fn deactivate_all(&mut self, lineage: &Lineage) -> Result<usize>;

    fn activate(&mut self, id: RevisionId) -> Result<()>;

    /// Insert an active revision and return its id
    fn insert(&mut self, revision: &NewRevision) -> Result<RevisionId>;

    fn get_document(&mut self, id: DocumentId) -> Result<Option<MachineDocument>>;

    /// Same match as [`RevisionStore::find_machine_document`], under the write lock
    fn find_machine_document(
        &mut self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        content_hash: &str,
    ) -> Result<Option<MachineDocument>>;

    fn insert_document(&mut self, document: &NewMachineDocument) -> Result<DocumentId>;

    /// Returns false when the document does not exist
    fn set_document_active(&mut self, id: DocumentId, active: bool) -> Result<bool>;

    fn commit(self: Box<Self>) -> Result<()>;
}
