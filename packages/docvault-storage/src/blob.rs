//! Blob Store
//!
//! Append-only tree of revision files under the data root:
//!
//! ```text
//! <root>/storage/<programs|prints|documents>/<scope>/<name>/rev_<n><ext>
//! ```
//!
//! Paths handed back to callers are relative to the root with `/`
//! separators, so a data root can be moved between deployments.
//! Existing files are never overwritten.
//!
//! Imports copy their source once into `<root>/staging`; that snapshot is
//! hashed and then renamed into the tree, so the recorded digest and the
//! stored bytes come from the same read.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{DocumentKey, MachineDocument};
use crate::error::{Result, StorageError};

pub const STORAGE_DIR: &str = "storage";
pub const DOCUMENTS_DIR: &str = "documents";
pub const STAGING_DIR: &str = "staging";
const PARTIAL_SUFFIX: &str = ".partial";

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Make a value safe as a single path component
///
/// Alphanumerics, `-` and `_` are kept; everything else becomes `_`.
/// A blank value falls back to `document`.
pub fn sanitize_token(value: &str) -> String {
    let token: String = value
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if token.is_empty() {
        "document".to_string()
    } else {
        token
    }
}

/// Where a lineage's blobs live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPlacement {
    pub area: &'static str,
    pub scope: String,
    pub name: String,
}

impl BlobPlacement {
    pub fn for_key(key: &DocumentKey) -> Self {
        Self {
            area: key.kind().storage_dir(),
            scope: key.scope_token(),
            name: key.filename().to_string(),
        }
    }

    pub fn for_document(document: &MachineDocument) -> Self {
        Self {
            area: DOCUMENTS_DIR,
            scope: document.scope_token(),
            name: document.name_token(),
        }
    }

    fn relative_dir(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            STORAGE_DIR,
            self.area,
            sanitize_token(&self.scope),
            sanitize_token(&self.name)
        )
    }
}

/// Snapshot of an import source waiting in `<root>/staging`
///
/// Removed on drop unless it was placed into the tree.
#[derive(Debug)]
pub struct StagedBlob {
    path: PathBuf,
    extension: String,
    placed: Option<PathBuf>,
}

impl StagedBlob {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move a placed blob back to staging after its row failed to commit
    pub fn unplace(&mut self) {
        if let Some(target) = self.placed.take() {
            if let Err(e) = fs::rename(&target, &self.path) {
                warn!(path = %target.display(), error = %e, "Failed to return blob to staging");
            }
        }
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if self.placed.is_none() && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged blob");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Copy `source` into `<root>/staging` as a private snapshot
    ///
    /// The snapshot is what gets hashed and what gets placed, so a source
    /// that changes mid-import cannot split the recorded digest from the
    /// stored bytes.
    pub fn stage(&self, source: &Path) -> Result<StagedBlob> {
        if !source.is_file() {
            return Err(StorageError::io(format!(
                "Source file is not readable: {}",
                source.display()
            )));
        }

        let dir = self.root.join(STAGING_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::io(format!("Cannot create {}: {}", dir.display(), e)).with_source(e)
        })?;

        let mut input = fs::File::open(source).map_err(|e| {
            StorageError::io(format!("Cannot read {}: {}", source.display(), e)).with_source(e)
        })?;
        let extension = extension_of(source);
        let (path, mut output) = create_staging_file(&dir, &extension)?;
        let staged = StagedBlob {
            path,
            extension,
            placed: None,
        };

        io::copy(&mut input, &mut output)
            .and_then(|_| output.sync_all())
            .map_err(|e| {
                StorageError::io(format!("Cannot stage {}: {}", source.display(), e))
                    .with_source(e)
            })?;
        debug!(source = %source.display(), staged = %staged.path.display(), "Source staged");
        Ok(staged)
    }

    /// Rename a staged snapshot into the tree as revision `revision_number`
    ///
    /// A final path never holds a half-written file. If the natural name is
    /// already taken (sanitised names can collide) a numbered variant
    /// `rev_<n>_<k><ext>` is used instead.
    ///
    /// Returns the path relative to the root.
    pub fn place(
        &self,
        staged: &mut StagedBlob,
        placement: &BlobPlacement,
        revision_number: u32,
    ) -> Result<String> {
        if staged.placed.is_some() {
            return Err(StorageError::internal("Staged blob is already placed"));
        }

        let relative_dir = placement.relative_dir();
        let target_dir = self.root.join(&relative_dir);
        fs::create_dir_all(&target_dir).map_err(|e| {
            StorageError::io(format!("Cannot create {}: {}", target_dir.display(), e))
                .with_source(e)
        })?;

        let file_name = free_file_name(&target_dir, revision_number, &staged.extension);
        let target = target_dir.join(&file_name);
        fs::rename(&staged.path, &target).map_err(|e| {
            StorageError::io(format!("Cannot write {}: {}", target.display(), e)).with_source(e)
        })?;
        staged.placed = Some(target);

        let stored = format!("{}/{}", relative_dir, file_name);
        debug!(stored_path = %stored, revision = revision_number, "Blob stored");
        Ok(stored)
    }

    /// Absolute path of a stored blob (existence not checked)
    pub fn resolve(&self, stored_path: &str) -> PathBuf {
        self.root.join(stored_path)
    }

    /// Absolute path of a stored blob, or `NotFound` if the file is gone
    pub fn open_existing(&self, stored_path: &str) -> Result<PathBuf> {
        let path = self.resolve(stored_path);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::blob_not_found(stored_path))
        }
    }

    /// Copy a blob out as `<document_name>_rev<n><ext>` inside `destination_dir`
    pub fn export(
        &self,
        stored_path: &str,
        destination_dir: &Path,
        document_name: &str,
        revision_number: u32,
    ) -> Result<PathBuf> {
        let source = self.open_existing(stored_path)?;
        fs::create_dir_all(destination_dir)?;

        let name: String = document_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let name = if name.trim().is_empty() {
            "document".to_string()
        } else {
            name
        };

        let target = destination_dir.join(format!(
            "{}_rev{}{}",
            name,
            revision_number,
            extension_of(&source)
        ));
        fs::copy(&source, &target).map_err(|e| {
            StorageError::io(format!("Cannot export to {}: {}", target.display(), e))
                .with_source(e)
        })?;
        Ok(target)
    }

    /// Every file under `storage/`, relative to the root
    pub fn scan(&self) -> Result<Vec<String>> {
        let storage = self.root.join(STORAGE_DIR);
        if !storage.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&storage).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::io(format!("Cannot scan blobs: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
        files.sort();
        Ok(files)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

fn create_staging_file(dir: &Path, extension: &str) -> Result<(PathBuf, fs::File)> {
    loop {
        let name = format!(
            "{}-{}{}{}",
            std::process::id(),
            STAGE_COUNTER.fetch_add(1, Ordering::Relaxed),
            extension,
            PARTIAL_SUFFIX
        );
        let path = dir.join(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            // Leftover from an earlier process with the same pid
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::io(format!(
                    "Cannot create {}: {}",
                    path.display(),
                    e
                ))
                .with_source(e))
            }
        }
    }
}

fn free_file_name(dir: &Path, revision_number: u32, ext: &str) -> String {
    let natural = format!("rev_{}{}", revision_number, ext);
    if !dir.join(&natural).exists() {
        return natural;
    }
    (2u32..)
        .map(|k| format!("rev_{}_{}{}", revision_number, k, ext))
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or(natural)
}
