//! Revision Engine
//!
//! Lineage-generic import / rollback / logical-delete algorithms. Keyed
//! program and print files and registry documents all run through here;
//! only the lineage and blob placement differ.
//!
//! Import order inside one write transaction:
//!
//! ```text
//! dedup check → deactivate all → blob rename → row insert → commit
//! ```
//!
//! The source is copied to staging and hashed before the transaction
//! opens; the blob written is that staged copy, never a second read of
//! the source.
//!
//! The blob is always written before the row that references it. If the
//! blob write fails the transaction rolls back and the previous head stays
//! active. A crash after the blob write leaves an unreferenced file, which
//! `inspect_blobs` reports.
//!
//! Everything here blocks; the async facades run it on the blocking pool.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blob::{BlobPlacement, BlobStore, StagedBlob};
use crate::config::StoreConfig;
use crate::domain::{
    DocumentId, ImportOutcome, Lineage, MachineDocument, NewMachineDocument, NewRevision,
    Revision, RevisionId, RevisionStore, RevisionTx,
};
use crate::error::{Result, StorageError};
use crate::hasher::ContentHasher;

/// One import into one lineage
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub lineage: Lineage,
    pub placement: BlobPlacement,
    pub source: PathBuf,
    pub created_by: String,
    pub notes: Option<String>,
}

/// Result of [`RevisionEngine::import_matching`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedImport {
    pub document_id: DocumentId,
    /// No active document matched, so one was created
    pub created_document: bool,
    pub outcome: ImportOutcome,
}

/// A row whose blob is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingBlob {
    pub revision_id: RevisionId,
    pub stored_path: String,
}

/// Read-only reconciliation of rows against the blob tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobReport {
    pub referenced: usize,
    pub missing: Vec<MissingBlob>,
    /// Files under `storage/` that no row references
    pub orphaned: Vec<String>,
}

impl BlobReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

pub struct RevisionEngine {
    store: Arc<dyn RevisionStore>,
    blobs: BlobStore,
    hasher: ContentHasher,
    import_retries: u32,
}

impl RevisionEngine {
    pub fn new(config: &StoreConfig, store: Arc<dyn RevisionStore>) -> Self {
        Self {
            store,
            blobs: BlobStore::new(config.data_root.clone()),
            hasher: ContentHasher::new(config.hash_buffer_bytes),
            import_retries: config.import_retries,
        }
    }

    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    /// Retry `Conflict` failures against a fresh head
    fn with_retries<T>(
        &self,
        operation: &str,
        subject: &dyn fmt::Display,
        mut attempt: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(e) if e.is_retryable() && retries < self.import_retries => {
                    retries += 1;
                    warn!(
                        lineage = %subject,
                        attempt = retries,
                        error = %e,
                        "{} conflicted, retrying",
                        operation
                    );
                }
                other => return other,
            }
        }
    }

    /// Snapshot the source and hash the snapshot
    fn stage(&self, source: &Path) -> Result<(StagedBlob, String)> {
        let staged = self.blobs.stage(source)?;
        let hash = self.hasher.hash_file(staged.path())?;
        Ok((staged, hash))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    pub fn import(&self, request: &ImportRequest) -> Result<ImportOutcome> {
        let (mut staged, hash) = self.stage(&request.source)?;
        self.with_retries("import", &request.lineage, || {
            let mut tx = self.store.begin()?;
            let outcome = self.write_revision(tx.as_mut(), request, &mut staged, &hash)?;
            Self::commit_placed(tx, &mut staged, outcome)
        })
    }

    /// Import into the registry document matching `document`, creating it
    /// when none matches
    ///
    /// Lookup, creation and the revision insert share one write
    /// transaction, so racing imports of the same new file agree on one
    /// document.
    pub fn import_matching(
        &self,
        document: &NewMachineDocument,
        source: &Path,
        notes: Option<&str>,
    ) -> Result<MatchedImport> {
        let (mut staged, hash) = self.stage(source)?;
        let subject = format!("{}/{}/{}", document.line, document.machine, document.doc_name);
        self.with_retries("import", &subject, || {
            let mut tx = self.store.begin()?;
            let existing = tx.find_machine_document(
                &document.line,
                &document.machine,
                &document.doc_type,
                &document.doc_name,
                &hash,
            )?;
            let (target, created_document) = match existing {
                Some(found) => (found, false),
                None => {
                    let id = tx.insert_document(document)?;
                    let created = tx.get_document(id)?.ok_or_else(|| {
                        StorageError::internal(format!("Document {} vanished after insert", id))
                    })?;
                    (created, true)
                }
            };

            let request = ImportRequest {
                lineage: Lineage::Registered(target.id),
                placement: BlobPlacement::for_document(&target),
                source: source.to_path_buf(),
                created_by: document.created_by.clone(),
                notes: notes.map(str::to_string),
            };
            let outcome = self.write_revision(tx.as_mut(), &request, &mut staged, &hash)?;
            let outcome = Self::commit_placed(tx, &mut staged, outcome)?;
            if created_document {
                info!(document = target.id, name = %target.doc_name, "Machine document created");
            }
            Ok(MatchedImport {
                document_id: target.id,
                created_document,
                outcome,
            })
        })
    }

    /// Dedup check, deactivate, blob placement and row insert inside `tx`
    ///
    /// The blob is placed before the row that references it. If the insert
    /// fails the blob goes back to staging for the next attempt.
    fn write_revision(
        &self,
        tx: &mut (dyn RevisionTx + '_),
        request: &ImportRequest,
        staged: &mut StagedBlob,
        hash: &str,
    ) -> Result<ImportOutcome> {
        let lineage = &request.lineage;
        let existing = tx.revisions(lineage)?;
        if let Some(duplicate) = existing.iter().find(|r| r.content_hash == hash) {
            debug!(
                lineage = %lineage,
                revision = duplicate.revision_number,
                hash = %hash,
                "Duplicate content, nothing stored"
            );
            return Ok(ImportOutcome::Duplicate {
                existing_revision_id: duplicate.id,
                revision_number: duplicate.revision_number,
            });
        }

        let head = existing.first();
        let revision_number = head.map(|r| r.revision_number + 1).unwrap_or(1);

        tx.deactivate_all(lineage)?;
        let stored_path = self
            .blobs
            .place(staged, &request.placement, revision_number)?;

        let original_filename = request
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let inserted = tx.insert(&NewRevision {
            lineage: lineage.clone(),
            revision_number,
            stored_path,
            content_hash: hash.to_string(),
            original_filename,
            created_at: Utc::now(),
            created_by: request.created_by.clone(),
            parent_id: head.map(|r| r.id),
            notes: request
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        });
        let revision_id = match inserted {
            Ok(id) => id,
            Err(e) => {
                staged.unplace();
                return Err(e);
            }
        };

        info!(lineage = %lineage, revision = revision_number, hash = %hash, "Revision created");
        Ok(ImportOutcome::Created {
            revision_id,
            revision_number,
        })
    }

    fn commit_placed(
        tx: Box<dyn RevisionTx + '_>,
        staged: &mut StagedBlob,
        outcome: ImportOutcome,
    ) -> Result<ImportOutcome> {
        if let Err(e) = tx.commit() {
            staged.unplace();
            return Err(e);
        }
        Ok(outcome)
    }

    /// Make `target` the only active revision of `lineage`
    ///
    /// No history is created or removed; a later import still numbers from
    /// the highest stored revision.
    pub fn rollback(&self, lineage: &Lineage, target: RevisionId) -> Result<Revision> {
        self.with_retries("rollback", lineage, || {
            let mut tx = self.store.begin()?;
            let revision = tx
                .get_revision(target)?
                .filter(|r| &r.lineage == lineage)
                .ok_or_else(|| {
                    StorageError::not_found(format!(
                        "Revision {} does not belong to {}",
                        target, lineage
                    ))
                })?;

            tx.deactivate_all(lineage)?;
            tx.activate(target)?;
            tx.commit()?;

            info!(lineage = %lineage, revision = revision.revision_number, "Rolled back");
            Ok(Revision {
                is_active: true,
                ..revision
            })
        })
    }

    /// Logical delete: deactivate every revision, keep rows and blobs
    ///
    /// Returns how many rows were active (0 or 1).
    pub fn deactivate_all(&self, lineage: &Lineage) -> Result<usize> {
        self.with_retries("deactivate", lineage, || {
            let mut tx = self.store.begin()?;
            if tx.revisions(lineage)?.is_empty() {
                return Err(StorageError::document_not_found(lineage));
            }
            let changed = tx.deactivate_all(lineage)?;
            tx.commit()?;
            info!(lineage = %lineage, deactivated = changed, "Document deactivated");
            Ok(changed)
        })
    }

    pub fn create_document(&self, document: &NewMachineDocument) -> Result<DocumentId> {
        let mut tx = self.store.begin()?;
        let id = tx.insert_document(document)?;
        tx.commit()?;
        info!(document = id, name = %document.doc_name, "Machine document created");
        Ok(id)
    }

    pub fn set_document_active(&self, id: DocumentId, active: bool) -> Result<()> {
        let mut tx = self.store.begin()?;
        if !tx.set_document_active(id, active)? {
            return Err(StorageError::document_not_found(Lineage::Registered(id)));
        }
        tx.commit()?;
        info!(document = id, active, "Machine document updated");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn list_revisions(&self, lineage: &Lineage) -> Result<Vec<Revision>> {
        self.store.list_revisions(lineage)
    }

    pub fn get_active(&self, lineage: &Lineage) -> Result<Option<Revision>> {
        self.store.get_active(lineage)
    }

    pub fn get_revision(&self, id: RevisionId) -> Result<Revision> {
        self.store
            .get_revision(id)?
            .ok_or_else(|| StorageError::revision_not_found(id))
    }

    pub fn get_document(&self, id: DocumentId) -> Result<MachineDocument> {
        self.store
            .get_document(id)?
            .ok_or_else(|| StorageError::document_not_found(Lineage::Registered(id)))
    }

    /// Key filename, or registry document name
    pub fn document_name(&self, revision: &Revision) -> Result<String> {
        match &revision.lineage {
            Lineage::Keyed(key) => Ok(key.filename().to_string()),
            Lineage::Registered(id) => Ok(self.get_document(*id)?.doc_name),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Blob access (read-only)
    // ═══════════════════════════════════════════════════════════════════════

    pub fn export(&self, id: RevisionId, destination_dir: &Path) -> Result<PathBuf> {
        let revision = self.get_revision(id)?;
        let name = self.document_name(&revision)?;
        let target = self.blobs.export(
            &revision.stored_path,
            destination_dir,
            &name,
            revision.revision_number,
        )?;
        debug!(revision = id, target = %target.display(), "Revision exported");
        Ok(target)
    }

    pub fn open_revision(&self, id: RevisionId) -> Result<PathBuf> {
        let revision = self.get_revision(id)?;
        self.blobs.open_existing(&revision.stored_path)
    }

    /// Re-hash the blob and compare with the recorded digest
    pub fn verify_revision(&self, id: RevisionId) -> Result<bool> {
        let revision = self.get_revision(id)?;
        let path = self.blobs.open_existing(&revision.stored_path)?;
        let actual = self.hasher.hash_file(&path)?;
        if actual != revision.content_hash {
            warn!(revision = id, expected = %revision.content_hash, actual = %actual, "Blob content changed");
            return Ok(false);
        }
        Ok(true)
    }

    pub fn inspect_blobs(&self) -> Result<BlobReport> {
        let rows = self.store.stored_paths()?;
        let referenced: HashSet<&str> = rows.iter().map(|(_, p)| p.as_str()).collect();

        let missing: Vec<MissingBlob> = rows
            .iter()
            .filter(|(_, path)| !self.blobs.resolve(path).is_file())
            .map(|(revision_id, stored_path)| MissingBlob {
                revision_id: *revision_id,
                stored_path: stored_path.clone(),
            })
            .collect();
        for blob in &missing {
            warn!(revision = blob.revision_id, path = %blob.stored_path, "Stored file missing");
        }

        let orphaned = self
            .blobs
            .scan()?
            .into_iter()
            .filter(|path| !referenced.contains(path.as_str()))
            .collect();

        Ok(BlobReport {
            referenced: rows.len(),
            missing,
            orphaned,
        })
    }
}
