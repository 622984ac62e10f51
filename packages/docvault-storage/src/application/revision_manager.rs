//! Revision Manager
//!
//! Async facade over the engine for keyed program and print files. Each
//! mutating call runs permission check → validation → blocking work →
//! audit, and the returned future resolves when the work is done.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::document_registry::DocumentRegistry;
use super::engine::{BlobReport, ImportRequest, RevisionEngine};
use crate::auth::{AccessControl, Actor, AuditSink, Authorizer, MANAGE_DOCUMENTS};
use crate::blob::BlobPlacement;
use crate::config::StoreConfig;
use crate::domain::{
    normalize_document_name, ArtifactKind, DocumentFilter, DocumentKey, DocumentSummary,
    ImportOutcome, Lineage, MachineRef, Revision, RevisionId, RevisionStore, ScopeType,
};
use crate::error::{Result, StorageError};

/// Outcome of one file in `import_many`
#[derive(Debug)]
pub struct BatchImport {
    pub source: PathBuf,
    pub document_name: String,
    pub outcome: Result<ImportOutcome>,
}

#[derive(Clone)]
pub struct RevisionManager {
    engine: Arc<RevisionEngine>,
    access: AccessControl,
    config: Arc<StoreConfig>,
}

impl RevisionManager {
    pub fn new(
        config: StoreConfig,
        store: Arc<dyn RevisionStore>,
        authorizer: Arc<dyn Authorizer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine: Arc::new(RevisionEngine::new(&config, store)),
            access: AccessControl::new(authorizer, audit),
            config: Arc::new(config),
        }
    }

    /// SQLite store at the configured location, role policy from the
    /// configuration, audit to `tracing`
    #[cfg(feature = "sqlite")]
    pub fn open(config: StoreConfig) -> Result<Self> {
        use crate::auth::{RolePolicy, TracingAuditSink};
        use crate::infrastructure::SqliteRevisionStore;

        config.validate()?;
        let store = Arc::new(SqliteRevisionStore::open(&config)?);
        let policy = Arc::new(RolePolicy::from_config(&config));
        Ok(Self::new(config, store, policy, Arc::new(TracingAuditSink)))
    }

    /// Registry facade sharing this manager's store, blobs and access control
    pub fn registry(&self) -> DocumentRegistry {
        DocumentRegistry::new(self.engine.clone(), self.access.clone())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<RevisionEngine> {
        &self.engine
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RevisionEngine) -> Result<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || work(&engine)).await?
    }

    fn key_details(key: &DocumentKey) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        details.insert("filename".to_string(), key.filename().to_string());
        details.insert("scope".to_string(), key.scope().as_str().to_string());
        if let Some(machine) = key.machine() {
            details.insert("machine".to_string(), machine.to_string());
        }
        details
    }

    fn check_extension(&self, kind: ArtifactKind, source: &Path) -> Result<()> {
        if self.config.is_extension_allowed(kind, source) {
            return Ok(());
        }
        Err(StorageError::validation(format!(
            "Unsupported file type for {}: {} (allowed: {})",
            kind,
            source.display(),
            self.config.allowed_extensions(kind).join(", ")
        )))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Import `source` as the next revision of `key`
    ///
    /// Returns `Duplicate` without writing anything when any revision of the
    /// key (active or not) already has the same content.
    pub async fn import(
        &self,
        key: &DocumentKey,
        source: &Path,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<ImportOutcome> {
        let action = format!("{}.create", key.kind().audit_prefix());
        self.access.require(actor, MANAGE_DOCUMENTS, &action).await?;

        let outcome = match self.check_extension(key.kind(), source) {
            Ok(()) => {
                let request = ImportRequest {
                    lineage: Lineage::from(key.clone()),
                    placement: BlobPlacement::for_key(key),
                    source: source.to_path_buf(),
                    created_by: actor.username.clone(),
                    notes: notes.map(str::to_string),
                };
                self.blocking(move |engine| engine.import(&request)).await
            }
            Err(e) => Err(e),
        };

        let mut details = Self::key_details(key);
        if let Ok(result) = &outcome {
            details.insert("status".to_string(), result.status().to_string());
            details.insert("revision".to_string(), result.revision_number().to_string());
        }
        self.access
            .record_outcome(&action, actor, details, &outcome)
            .await;
        outcome
    }

    /// Import several files into one scope, continuing past failures
    ///
    /// Each document name is derived from the file name with
    /// `normalize_document_name`.
    pub async fn import_many(
        &self,
        kind: ArtifactKind,
        scope: ScopeType,
        machine: Option<MachineRef>,
        sources: &[PathBuf],
        actor: &Actor,
    ) -> Vec<BatchImport> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let document_name = normalize_document_name(&file_name);

            let outcome = match DocumentKey::new(kind, scope, machine, &document_name) {
                Ok(key) => self.import(&key, source, None, actor).await,
                Err(e) => Err(e),
            };
            results.push(BatchImport {
                source: source.clone(),
                document_name,
                outcome,
            });
        }
        results
    }

    /// Reactivate `target` (which must belong to `key`)
    pub async fn rollback(
        &self,
        key: &DocumentKey,
        target: RevisionId,
        actor: &Actor,
    ) -> Result<Revision> {
        let action = format!("{}.rollback", key.kind().audit_prefix());
        self.access.require(actor, MANAGE_DOCUMENTS, &action).await?;

        let lineage = Lineage::from(key.clone());
        let outcome = self
            .blocking(move |engine| engine.rollback(&lineage, target))
            .await;

        let mut details = Self::key_details(key);
        details.insert("target_revision_id".to_string(), target.to_string());
        if let Ok(revision) = &outcome {
            details.insert("revision".to_string(), revision.revision_number.to_string());
        }
        self.access
            .record_outcome(&action, actor, details, &outcome)
            .await;
        outcome
    }

    /// Logical delete of `key`; history stays listable
    pub async fn deactivate_all(&self, key: &DocumentKey, actor: &Actor) -> Result<usize> {
        let action = format!("{}.deactivate", key.kind().audit_prefix());
        self.access.require(actor, MANAGE_DOCUMENTS, &action).await?;

        let lineage = Lineage::from(key.clone());
        let outcome = self
            .blocking(move |engine| engine.deactivate_all(&lineage))
            .await;

        self.access
            .record_outcome(&action, actor, Self::key_details(key), &outcome)
            .await;
        outcome
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn list_revisions(&self, key: &DocumentKey) -> Result<Vec<Revision>> {
        let lineage = Lineage::from(key.clone());
        self.blocking(move |engine| engine.list_revisions(&lineage))
            .await
    }

    pub async fn get_active(&self, key: &DocumentKey) -> Result<Option<Revision>> {
        let lineage = Lineage::from(key.clone());
        self.blocking(move |engine| engine.get_active(&lineage)).await
    }

    pub async fn get_revision(&self, id: RevisionId) -> Result<Revision> {
        self.blocking(move |engine| engine.get_revision(id)).await
    }

    pub async fn list_documents(&self, filter: DocumentFilter) -> Result<Vec<DocumentSummary>> {
        self.blocking(move |engine| engine.store().list_documents(&filter))
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Blob access
    // ═══════════════════════════════════════════════════════════════════════

    /// Copy a revision out as `<filename>_rev<n><ext>`
    pub async fn export(&self, id: RevisionId, destination_dir: &Path) -> Result<PathBuf> {
        let destination_dir = destination_dir.to_path_buf();
        self.blocking(move |engine| engine.export(id, &destination_dir))
            .await
    }

    pub async fn open_revision(&self, id: RevisionId) -> Result<PathBuf> {
        self.blocking(move |engine| engine.open_revision(id)).await
    }

    pub async fn verify_revision(&self, id: RevisionId) -> Result<bool> {
        self.blocking(move |engine| engine.verify_revision(id)).await
    }

    pub async fn inspect_blobs(&self) -> Result<BlobReport> {
        self.blocking(|engine| engine.inspect_blobs()).await
    }
}
