//! Document Registry
//!
//! Machine-history variant: named documents (manuals, certificates,
//! programs kept per machine) identified by a store-assigned id instead of
//! a filename key. Revisions use the same record shape and the same
//! import/rollback algorithms as keyed files.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::engine::{ImportRequest, RevisionEngine};
use crate::auth::{AccessControl, Actor, MANAGE_DOCUMENTS};
use crate::blob::BlobPlacement;
use crate::domain::{
    normalize_document_name, DocumentId, ImportOutcome, Lineage, MachineDocument,
    MachineDocumentSummary, NewMachineDocument, RegistryFilter, Revision, RevisionId,
};
use crate::error::Result;
use crate::validation;

const ACTION_CREATE: &str = "machine_document.create";
const ACTION_REVISION: &str = "machine_document.revision";
const ACTION_ROLLBACK: &str = "machine_document.rollback";
const ACTION_SET_ACTIVE: &str = "machine_document.set_active";

#[derive(Clone)]
pub struct DocumentRegistry {
    engine: Arc<RevisionEngine>,
    access: AccessControl,
}

impl DocumentRegistry {
    pub fn new(engine: Arc<RevisionEngine>, access: AccessControl) -> Self {
        Self { engine, access }
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RevisionEngine) -> Result<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || work(&engine)).await?
    }

    fn document_details(document_id: DocumentId) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        details.insert("document_id".to_string(), document_id.to_string());
        details
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn create_document(
        &self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        actor: &Actor,
    ) -> Result<DocumentId> {
        self.access
            .require(actor, MANAGE_DOCUMENTS, ACTION_CREATE)
            .await?;

        let document = NewMachineDocument {
            line: line.trim().to_string(),
            machine: machine.trim().to_string(),
            doc_type: doc_type.trim().to_string(),
            doc_name: doc_name.trim().to_string(),
            created_at: Utc::now(),
            created_by: actor.username.clone(),
        };

        let mut details = BTreeMap::new();
        details.insert("line".to_string(), document.line.clone());
        details.insert("machine".to_string(), document.machine.clone());
        details.insert("doc_type".to_string(), document.doc_type.clone());
        details.insert("doc_name".to_string(), document.doc_name.clone());

        let outcome = match validation::validate_machine_document(
            &document.line,
            &document.machine,
            &document.doc_type,
            &document.doc_name,
        ) {
            Ok(()) => {
                self.blocking(move |engine| engine.create_document(&document))
                    .await
            }
            Err(e) => Err(e),
        };

        if let Ok(id) = &outcome {
            details.insert("document_id".to_string(), id.to_string());
        }
        self.access
            .record_outcome(ACTION_CREATE, actor, details, &outcome)
            .await;
        outcome
    }

    /// Import `source` as the next revision of a registry document
    pub async fn import_revision(
        &self,
        document_id: DocumentId,
        source: &Path,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<ImportOutcome> {
        self.access
            .require(actor, MANAGE_DOCUMENTS, ACTION_REVISION)
            .await?;

        let source_path = source.to_path_buf();
        let notes = notes.map(str::to_string);
        let created_by = actor.username.clone();
        let outcome = self
            .blocking(move |engine| {
                let document = engine.get_document(document_id)?;
                engine.import(&ImportRequest {
                    lineage: Lineage::Registered(document_id),
                    placement: BlobPlacement::for_document(&document),
                    source: source_path,
                    created_by,
                    notes,
                })
            })
            .await;

        let mut details = Self::document_details(document_id);
        details.insert("source".to_string(), source.display().to_string());
        if let Ok(result) = &outcome {
            details.insert("status".to_string(), result.status().to_string());
            details.insert("revision".to_string(), result.revision_number().to_string());
        }
        self.access
            .record_outcome(ACTION_REVISION, actor, details, &outcome)
            .await;
        outcome
    }

    /// Import a file into the matching document, creating one if needed
    ///
    /// The document name comes from the file name. An active document in
    /// the same line/machine/type matches when its name is equal ignoring
    /// case or when one of its revisions already has the same content.
    /// Matching, creation and the import run in one write transaction.
    pub async fn import_file(
        &self,
        line: &str,
        machine: &str,
        doc_type: &str,
        source: &Path,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<(DocumentId, ImportOutcome)> {
        self.access
            .require(actor, MANAGE_DOCUMENTS, ACTION_REVISION)
            .await?;

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = NewMachineDocument {
            line: line.trim().to_string(),
            machine: machine.trim().to_string(),
            doc_type: doc_type.trim().to_string(),
            doc_name: normalize_document_name(&file_name),
            created_at: Utc::now(),
            created_by: actor.username.clone(),
        };

        let mut details = BTreeMap::new();
        details.insert("line".to_string(), document.line.clone());
        details.insert("machine".to_string(), document.machine.clone());
        details.insert("doc_type".to_string(), document.doc_type.clone());
        details.insert("doc_name".to_string(), document.doc_name.clone());
        details.insert("source".to_string(), source.display().to_string());

        let outcome = match validation::validate_machine_document(
            &document.line,
            &document.machine,
            &document.doc_type,
            &document.doc_name,
        ) {
            Ok(()) => {
                let source_path = source.to_path_buf();
                let notes = notes.map(str::to_string);
                self.blocking(move |engine| {
                    engine.import_matching(&document, &source_path, notes.as_deref())
                })
                .await
            }
            Err(e) => Err(e),
        };

        if let Ok(matched) = &outcome {
            details.insert("document_id".to_string(), matched.document_id.to_string());
            if matched.created_document {
                self.access
                    .record_outcome(ACTION_CREATE, actor, details.clone(), &outcome)
                    .await;
            }
            details.insert("status".to_string(), matched.outcome.status().to_string());
            details.insert(
                "revision".to_string(),
                matched.outcome.revision_number().to_string(),
            );
        }
        self.access
            .record_outcome(ACTION_REVISION, actor, details, &outcome)
            .await;
        outcome.map(|matched| (matched.document_id, matched.outcome))
    }

    /// Reactivate `revision_id`, which must belong to `document_id`
    pub async fn rollback(
        &self,
        document_id: DocumentId,
        revision_id: RevisionId,
        actor: &Actor,
    ) -> Result<Revision> {
        self.access
            .require(actor, MANAGE_DOCUMENTS, ACTION_ROLLBACK)
            .await?;

        let outcome = self
            .blocking(move |engine| {
                engine.rollback(&Lineage::Registered(document_id), revision_id)
            })
            .await;

        let mut details = Self::document_details(document_id);
        details.insert("target_revision_id".to_string(), revision_id.to_string());
        self.access
            .record_outcome(ACTION_ROLLBACK, actor, details, &outcome)
            .await;
        outcome
    }

    /// Document-level logical delete / restore
    pub async fn set_active(
        &self,
        document_id: DocumentId,
        active: bool,
        actor: &Actor,
    ) -> Result<()> {
        self.access
            .require(actor, MANAGE_DOCUMENTS, ACTION_SET_ACTIVE)
            .await?;

        let outcome = self
            .blocking(move |engine| engine.set_document_active(document_id, active))
            .await;

        let mut details = Self::document_details(document_id);
        details.insert("active".to_string(), active.to_string());
        self.access
            .record_outcome(ACTION_SET_ACTIVE, actor, details, &outcome)
            .await;
        outcome
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_document(&self, document_id: DocumentId) -> Result<MachineDocument> {
        self.blocking(move |engine| engine.get_document(document_id))
            .await
    }

    pub async fn list_documents(
        &self,
        filter: RegistryFilter,
    ) -> Result<Vec<MachineDocumentSummary>> {
        self.blocking(move |engine| engine.store().list_machine_documents(&filter))
            .await
    }

    /// Revisions newest first; `NotFound` for an unknown document
    pub async fn list_revisions(&self, document_id: DocumentId) -> Result<Vec<Revision>> {
        self.blocking(move |engine| {
            engine.get_document(document_id)?;
            engine.list_revisions(&Lineage::Registered(document_id))
        })
        .await
    }

    pub async fn get_active(&self, document_id: DocumentId) -> Result<Option<Revision>> {
        self.blocking(move |engine| {
            engine.get_document(document_id)?;
            engine.get_active(&Lineage::Registered(document_id))
        })
        .await
    }

    pub async fn find_existing(
        &self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        content_hash: &str,
    ) -> Result<Option<MachineDocument>> {
        let (line, machine, doc_type, doc_name, content_hash) = (
            line.trim().to_string(),
            machine.trim().to_string(),
            doc_type.trim().to_string(),
            doc_name.to_string(),
            content_hash.to_string(),
        );
        self.blocking(move |engine| {
            engine
                .store()
                .find_machine_document(&line, &machine, &doc_type, &doc_name, &content_hash)
        })
        .await
    }

    /// Copy a revision out as `<doc_name>_rev<n><ext>`
    pub async fn export(&self, revision_id: RevisionId, destination_dir: &Path) -> Result<PathBuf> {
        let destination_dir = destination_dir.to_path_buf();
        self.blocking(move |engine| engine.export(revision_id, &destination_dir))
            .await
    }
}
