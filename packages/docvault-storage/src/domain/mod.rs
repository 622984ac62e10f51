//! Domain layer
//!
//! - `models`: typed keys, lineages, revisions, filters, registry documents
//! - `ports`: `RevisionStore` / `RevisionTx` traits implemented by infrastructure

pub mod models;
pub mod ports;

pub use models::{
    normalize_document_name, ArtifactKind, DocumentFilter, DocumentId, DocumentKey,
    DocumentSummary, ImportOutcome, Lineage, MachineDocument, MachineDocumentSummary,
    MachineFilter, MachineRef, NewMachineDocument, NewRevision, RegistryFilter, Revision,
    RevisionId, ScopeType,
};
pub use ports::{RevisionStore, RevisionTx};
