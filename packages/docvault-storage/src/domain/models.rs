//! Revision Domain Models
//!
//! Typed replacements for loosely-shaped revision records:
//! - `DocumentKey`: `(kind, scope, machine?, filename)` validated at construction
//! - `Lineage`: the chain a revision belongs to (keyed file or registry document)
//! - `Revision`: immutable stored version; only `is_active` ever changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StorageError};
use crate::validation;

/// Store-assigned revision row id
pub type RevisionId = i64;

/// Store-assigned registry document id
pub type DocumentId = i64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact kind & scope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Artifact kind: controls storage sub-path, extensions and audit names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Machine program (G-code and friends)
    Program,
    /// Engineering print / drawing
    Print,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Program, ArtifactKind::Print];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Program => "program",
            ArtifactKind::Print => "print",
        }
    }

    /// Sub-directory under `storage/`
    pub fn storage_dir(&self) -> &'static str {
        match self {
            ArtifactKind::Program => "programs",
            ArtifactKind::Print => "prints",
        }
    }

    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Program => &[".txt", ".nc", ".tap", ".cnc"],
            ArtifactKind::Print => &[".pdf", ".png", ".jpg", ".jpeg"],
        }
    }

    /// Prefix used for audit action names (`program_file.create`)
    pub fn audit_prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Program => "program_file",
            ArtifactKind::Print => "print_file",
        }
    }

    pub(crate) fn validation_context(&self) -> &'static str {
        match self {
            ArtifactKind::Program => "program revision",
            ArtifactKind::Print => "print revision",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "program" | "programs" => Ok(ArtifactKind::Program),
            "print" | "prints" => Ok(ArtifactKind::Print),
            other => Err(StorageError::validation(format!(
                "Unknown artifact kind '{}' (expected program or print)",
                other
            ))),
        }
    }
}

/// Whether a document key applies globally or to one machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScopeType {
    Global,
    Machine,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "GLOBAL",
            ScopeType::Machine => "MACHINE",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(ScopeType::Global),
            "MACHINE" => Ok(ScopeType::Machine),
            other => Err(StorageError::validation(format!(
                "Unknown scope type '{}' (expected GLOBAL or MACHINE)",
                other
            ))),
        }
    }
}

/// Strictly positive machine identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MachineRef(i64);

impl MachineRef {
    pub fn new(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(StorageError::validation(format!(
                "Machine reference must be positive, got {}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for MachineRef {
    type Error = StorageError;

    fn try_from(value: i64) -> Result<Self> {
        MachineRef::new(value)
    }
}

impl From<MachineRef> for i64 {
    fn from(value: MachineRef) -> i64 {
        value.0
    }
}

impl fmt::Display for MachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document key & lineage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Composite identifier of one keyed revision chain
///
/// Equality is structural: a machine-scoped key without a machine is its own
/// bucket and never matches a key for a specific machine.
///
/// Fields are private so every key, including deserialized ones, passes
/// through [`DocumentKey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDocumentKey")]
pub struct DocumentKey {
    kind: ArtifactKind,
    scope: ScopeType,
    machine: Option<MachineRef>,
    filename: String,
}

/// Unchecked wire shape of [`DocumentKey`]
#[derive(Deserialize)]
struct RawDocumentKey {
    kind: ArtifactKind,
    scope: ScopeType,
    machine: Option<MachineRef>,
    filename: String,
}

impl TryFrom<RawDocumentKey> for DocumentKey {
    type Error = StorageError;

    fn try_from(raw: RawDocumentKey) -> Result<Self> {
        DocumentKey::new(raw.kind, raw.scope, raw.machine, raw.filename)
    }
}

impl DocumentKey {
    /// Build a key, trimming the filename
    ///
    /// # Errors
    ///
    /// - `Validation` if the filename is blank
    /// - `Validation` if a global key carries a machine reference
    pub fn new(
        kind: ArtifactKind,
        scope: ScopeType,
        machine: Option<MachineRef>,
        filename: impl AsRef<str>,
    ) -> Result<Self> {
        let filename = filename.as_ref().trim();
        validation::require_fields(kind.validation_context(), &[("filename", Some(filename))])?;

        if scope == ScopeType::Global && machine.is_some() {
            return Err(StorageError::validation(
                "Global documents cannot reference a machine",
            ));
        }

        Ok(Self {
            kind,
            scope,
            machine,
            filename: filename.to_string(),
        })
    }

    /// Build a key from raw, caller-supplied strings
    ///
    /// Missing filename and scope are reported together before either is parsed.
    pub fn parse(
        kind: ArtifactKind,
        scope: Option<&str>,
        machine: Option<i64>,
        filename: Option<&str>,
    ) -> Result<Self> {
        validation::require_fields(
            kind.validation_context(),
            &[("filename", filename), ("scope_type", scope)],
        )?;
        let scope: ScopeType = scope.unwrap_or_default().parse()?;
        let machine = machine.map(MachineRef::new).transpose()?;
        Self::new(kind, scope, machine, filename.unwrap_or_default())
    }

    pub fn global(kind: ArtifactKind, filename: impl AsRef<str>) -> Result<Self> {
        Self::new(kind, ScopeType::Global, None, filename)
    }

    pub fn for_machine(
        kind: ArtifactKind,
        machine: MachineRef,
        filename: impl AsRef<str>,
    ) -> Result<Self> {
        Self::new(kind, ScopeType::Machine, Some(machine), filename)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn scope(&self) -> ScopeType {
        self.scope
    }

    pub fn machine(&self) -> Option<MachineRef> {
        self.machine
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Directory token for the blob tree: `GLOBAL`, `MACHINE` or `MACHINE_<id>`
    pub fn scope_token(&self) -> String {
        match self.machine {
            Some(machine) => format!("{}_{}", self.scope.as_str(), machine),
            None => self.scope.as_str().to_string(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Lineage::Keyed(self.clone()).token())
    }
}

/// The chain a revision belongs to
///
/// Canonical tokens (only the last component is free text):
/// - `program:MACHINE:7:drawing`
/// - `print:GLOBAL:-:spec`
/// - `document:12`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lineage {
    Keyed(DocumentKey),
    Registered(DocumentId),
}

impl Lineage {
    pub fn token(&self) -> String {
        match self {
            Lineage::Keyed(key) => format!(
                "{}:{}:{}:{}",
                key.kind.as_str(),
                key.scope.as_str(),
                key.machine
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                key.filename
            ),
            Lineage::Registered(id) => format!("document:{}", id),
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        let bad = || StorageError::validation(format!("Malformed lineage token '{}'", token));

        if let Some(id) = token.strip_prefix("document:") {
            return id.parse().map(Lineage::Registered).map_err(|_| bad());
        }

        let mut parts = token.splitn(4, ':');
        let kind: ArtifactKind = parts.next().ok_or_else(bad)?.parse()?;
        let scope: ScopeType = parts.next().ok_or_else(bad)?.parse()?;
        let machine = match parts.next().ok_or_else(bad)? {
            "-" => None,
            raw => Some(MachineRef::new(raw.parse().map_err(|_| bad())?)?),
        };
        let filename = parts.next().ok_or_else(bad)?;
        DocumentKey::new(kind, scope, machine, filename).map(Lineage::Keyed)
    }

    pub fn key(&self) -> Option<&DocumentKey> {
        match self {
            Lineage::Keyed(key) => Some(key),
            Lineage::Registered(_) => None,
        }
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        match self {
            Lineage::Keyed(_) => None,
            Lineage::Registered(id) => Some(*id),
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl From<DocumentKey> for Lineage {
    fn from(key: DocumentKey) -> Self {
        Lineage::Keyed(key)
    }
}

impl Serialize for Lineage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for Lineage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Lineage::from_token(&token).map_err(serde::de::Error::custom)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Revisions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable stored version of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub lineage: Lineage,

    /// 1-based, gapless within the lineage, never reused
    pub revision_number: u32,

    /// Blob location relative to the data root
    pub stored_path: String,

    /// Lowercase hex SHA-256 of the blob
    pub content_hash: String,

    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,

    /// Head of the lineage when this revision was created
    pub parent_id: Option<RevisionId>,

    pub is_active: bool,
    pub notes: Option<String>,
}

impl Revision {
    /// Extension of the stored blob including the dot, or empty
    pub fn extension(&self) -> String {
        Path::new(&self.stored_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }
}

/// Row to insert; the store assigns the id and marks it active
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub lineage: Lineage,
    pub revision_number: u32,
    pub stored_path: String,
    pub content_hash: String,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub parent_id: Option<RevisionId>,
    pub notes: Option<String>,
}

/// Typed import result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportOutcome {
    Created {
        revision_id: RevisionId,
        revision_number: u32,
    },
    /// Same bytes already stored in this lineage; nothing was written
    Duplicate {
        existing_revision_id: RevisionId,
        revision_number: u32,
    },
}

impl ImportOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ImportOutcome::Duplicate { .. })
    }

    pub fn revision_id(&self) -> RevisionId {
        match self {
            ImportOutcome::Created { revision_id, .. } => *revision_id,
            ImportOutcome::Duplicate {
                existing_revision_id,
                ..
            } => *existing_revision_id,
        }
    }

    pub fn revision_number(&self) -> u32 {
        match self {
            ImportOutcome::Created {
                revision_number, ..
            }
            | ImportOutcome::Duplicate {
                revision_number, ..
            } => *revision_number,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ImportOutcome::Created { .. } => "CREATED",
            ImportOutcome::Duplicate { .. } => "DUPLICATE",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Machine restriction for document listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineFilter {
    #[default]
    Any,
    /// Only keys without a machine reference
    Unassigned,
    /// Only keys bound to exactly this machine
    Only(MachineRef),
}

/// Filters for `list_documents`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub kind: Option<ArtifactKind>,
    pub scope: Option<ScopeType>,
    pub machine: MachineFilter,

    /// Case-insensitive substring over filename and revision notes
    pub search: Option<String>,

    /// Also list logically deleted keys (no active revision)
    pub include_inactive: bool,
}

impl DocumentFilter {
    pub fn kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn scope(mut self, scope: ScopeType) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn machine(mut self, machine: MachineFilter) -> Self {
        self.machine = machine;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn include_inactive(mut self, include: bool) -> Self {
        self.include_inactive = include;
        self
    }
}

/// One listed key with its active revision (or newest when none is active)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub key: DocumentKey,
    pub current: Revision,
    pub revision_count: u32,
}

impl DocumentSummary {
    pub fn is_active(&self) -> bool {
        self.current.is_active
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Named machine document (manual, certificate, ...) revisioned by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDocument {
    pub id: DocumentId,
    pub line: String,
    pub machine: String,
    pub doc_type: String,
    pub doc_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl MachineDocument {
    /// Blob scope token `<line>_<machine>`
    pub fn scope_token(&self) -> String {
        format!("{}_{}", self.line, self.machine)
    }

    /// Blob name token `<id>_<doc_name>`
    pub fn name_token(&self) -> String {
        format!("{}_{}", self.id, self.doc_name)
    }
}

#[derive(Debug, Clone)]
pub struct NewMachineDocument {
    pub line: String,
    pub machine: String,
    pub doc_type: String,
    pub doc_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFilter {
    pub line: Option<String>,
    pub machine: Option<String>,
    pub doc_type: Option<String>,

    /// Case-insensitive substring over name, original filenames and notes
    pub search: Option<String>,
    pub include_inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDocumentSummary {
    pub document: MachineDocument,
    /// Active revision, else the newest; `None` before the first import
    pub current: Option<Revision>,
}

/// Derive a document name from a source file name
///
/// `"Spindle_Manual  v2.pdf"` → `"Spindle Manual v2"`
pub fn normalize_document_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
