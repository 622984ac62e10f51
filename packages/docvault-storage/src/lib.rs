//! docvault-storage: versioned, content-addressed artifact store
//!
//! Machine programs, engineering prints and registry documents are kept as
//! immutable revisions: a blob in a sanitized directory tree plus a row in
//! SQLite.
//!
//! ## Invariants
//!
//! 1. Revision numbers per lineage are gapless `1..N` and never reused
//! 2. At most one revision per lineage is active (also enforced by the schema)
//! 3. Revisions are never edited or deleted; only `is_active` moves
//! 4. `parent_id` forms one linear chain per lineage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docvault_storage::{Actor, ArtifactKind, DocumentKey, MachineRef, RevisionManager, StoreConfig};
//!
//! let manager = RevisionManager::open(StoreConfig::new("/srv/docvault"))?;
//! let actor = Actor::new("alice", "engineer");
//! let key = DocumentKey::for_machine(ArtifactKind::Print, MachineRef::new(7)?, "drawing")?;
//!
//! // Created { revision_number: 1, .. }, then Duplicate for the same bytes
//! manager.import(&key, "drawing.pdf".as_ref(), None, &actor).await?;
//!
//! // Move the active pointer back without touching history
//! let history = manager.list_revisions(&key).await?;
//! manager.rollback(&key, history.last().unwrap().id, &actor).await?;
//! ```

pub mod application;
pub mod auth;
pub mod blob;
pub mod config;
pub mod domain;
pub mod error;
pub mod hasher;
pub mod validation;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use application::{
    BatchImport, BlobReport, DocumentRegistry, ImportRequest, MatchedImport, MissingBlob,
    RevisionEngine, RevisionManager,
};
pub use auth::{
    Actor, AllowAll, AuditRecord, AuditSink, Authorizer, MemoryAuditSink, RolePolicy,
    TracingAuditSink, MANAGE_DOCUMENTS, PERMISSION_DENIED_ACTION,
};
pub use blob::{sanitize_token, BlobPlacement, BlobStore, StagedBlob};
pub use config::{ConfigError, StoreConfig};
pub use domain::{
    normalize_document_name, ArtifactKind, DocumentFilter, DocumentId, DocumentKey,
    DocumentSummary, ImportOutcome, Lineage, MachineDocument, MachineDocumentSummary,
    MachineFilter, MachineRef, RegistryFilter, Revision, RevisionId, RevisionStore, ScopeType,
};
pub use hasher::ContentHasher;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteRevisionStore;
