//! Error types for docvault-storage

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input (filename, scope, document fields)
    Validation,
    /// Unknown document key, revision, document id, or missing blob
    NotFound,
    /// Actor lacks the required permission
    PermissionDenied,
    /// Hash/read/copy/write failures
    IO,
    /// Database errors (SQLite)
    Database,
    /// Unique-key race or lock contention; safe to retry
    Conflict,
    /// Configuration errors
    Config,
    /// Background worker failures
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::IO => "io",
            ErrorKind::Database => "database",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn revision_not_found(revision_id: impl fmt::Display) -> Self {
        Self::not_found(format!("Revision not found: {}", revision_id))
    }

    pub fn document_not_found(lineage: impl fmt::Display) -> Self {
        Self::not_found(format!("Document not found: {}", lineage))
    }

    pub fn blob_not_found(stored_path: impl fmt::Display) -> Self {
        Self::not_found(format!("Stored file not found: {}", stored_path))
    }

    pub fn permission_denied(username: &str, action: &str) -> Self {
        Self::new(
            ErrorKind::PermissionDenied,
            format!("{} lacks permission for {}", username, action),
        )
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IO, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether the failed operation may succeed against a fresh head.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::io(format!("I/O error: {}", err)).with_source(err)
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        // Only a unique-key race or lock contention can clear on retry;
        // CHECK and FOREIGN KEY failures would fail the same way again
        let contended = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => {
                matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) || matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
            }
            _ => false,
        };
        if contended {
            StorageError::conflict(format!("SQLite conflict: {}", err)).with_source(err)
        } else {
            StorageError::database(format!("SQLite error: {}", err)).with_source(err)
        }
    }
}

impl From<ConfigError> for StorageError {
    fn from(err: ConfigError) -> Self {
        StorageError::new(ErrorKind::Config, err.to_string()).with_source(err)
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::internal(format!("Background worker failed: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    // ═══════════════════════════════════════════════════════════════════════
    // Error Construction Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_error_display() {
        let err = StorageError::revision_not_found(42);
        let msg = format!("{}", err);
        assert_eq!(msg, "[not_found] Revision not found: 42");
    }

    #[test]
    fn test_validation_error() {
        let err = StorageError::validation("Missing required program revision fields: filename");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.source.is_none());
        assert!(format!("{}", err).starts_with("[validation] Missing"));
    }

    #[test]
    fn test_permission_denied() {
        let err = StorageError::permission_denied("op1", "program_file.create");
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(err.message, "op1 lacks permission for program_file.create");
    }

    #[test]
    fn test_with_source() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = StorageError::io("copy failed").with_source(io_err);

        let source = err.source().unwrap();
        assert!(source.to_string().contains("file not found"));
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(StorageError::conflict("busy").is_retryable());
        assert!(!StorageError::database("corrupt").is_retryable());
        assert!(!StorageError::io("disk full").is_retryable());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ErrorKind Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::Validation.as_str(), "validation");
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::PermissionDenied.as_str(), "permission_denied");
        assert_eq!(ErrorKind::IO.as_str(), "io");
        assert_eq!(ErrorKind::Database.as_str(), "database");
        assert_eq!(ErrorKind::Conflict.as_str(), "conflict");
        assert_eq!(ErrorKind::Config.as_str(), "config");
        assert_eq!(ErrorKind::Internal.as_str(), "internal");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Conversion Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: StorageError = io_err.into();
        assert_eq!(err.kind, ErrorKind::IO);
        assert!(err.message.contains("read-only"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_from_rusqlite_error() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.message.contains("SQLite error"));
        assert!(err.source.is_some());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_constraint_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let sqlite_err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();

        let err: StorageError = sqlite_err.into();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_check_and_foreign_key_failures_are_not_retryable() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 n INTEGER CHECK (n > 0),
                 parent_id INTEGER REFERENCES parent(id)
             );",
        )
        .unwrap();

        let check: StorageError = conn
            .execute("INSERT INTO child (n) VALUES (0)", [])
            .unwrap_err()
            .into();
        assert_eq!(check.kind, ErrorKind::Database);
        assert!(!check.is_retryable());

        let foreign: StorageError = conn
            .execute("INSERT INTO child (n, parent_id) VALUES (1, 99)", [])
            .unwrap_err()
            .into();
        assert_eq!(foreign.kind, ErrorKind::Database);
        assert!(!foreign.is_retryable());
    }

    #[test]
    fn test_from_config_error() {
        let err: StorageError = ConfigError::MissingVersion.into();
        assert_eq!(err.kind, ErrorKind::Config);
    }
}
