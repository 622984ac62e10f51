//! Application layer
//!
//! ```text
//! RevisionManager / DocumentRegistry   (async, permission + audit)
//!                  ↓
//!            RevisionEngine            (blocking, invariants)
//!                  ↓
//!      RevisionStore port + BlobStore
//! ```

pub mod document_registry;
pub mod engine;
pub mod revision_manager;

pub use document_registry::DocumentRegistry;
pub use engine::{BlobReport, ImportRequest, MatchedImport, MissingBlob, RevisionEngine};
pub use revision_manager::{BatchImport, RevisionManager};
