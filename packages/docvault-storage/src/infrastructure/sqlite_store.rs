//! SQLite Revision Store
//!
//! File-based metadata store shared by every seat on the same machine.
//! The schema enforces the revision invariants on its own:
//! - `UNIQUE (lineage, revision_number)`: numbers are never reused
//! - partial unique index on `lineage WHERE is_active = 1`: one active row
//!
//! Write transactions use `BEGIN IMMEDIATE`, so the write lock is taken up
//! front and a second writer (thread or process) waits on `busy_timeout`
//! instead of reading a head that is about to change.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::domain::{
    DocumentFilter, DocumentId, DocumentSummary, Lineage, MachineDocument,
    MachineDocumentSummary, MachineFilter, NewMachineDocument, NewRevision, RegistryFilter,
    Revision, RevisionId, RevisionStore, RevisionTx,
};
use crate::error::{Result, StorageError};

const REVISION_COLUMNS: &str = "r.id, r.lineage, r.revision_number, r.stored_path, r.content_hash, \
     r.original_filename, r.created_at, r.created_by, r.parent_id, r.is_active, r.notes";
const REVISION_COLUMN_COUNT: usize = 11;

const DOCUMENT_COLUMNS: &str =
    "d.id, d.line_code, d.machine_code, d.doc_type, d.doc_name, d.is_active, d.created_at, d.created_by";
const DOCUMENT_COLUMN_COUNT: usize = 8;

/// SQLite-based `RevisionStore`
#[derive(Clone)]
pub struct SqliteRevisionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRevisionStore {
    /// Open (or create) the database named by the configuration
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::new(config.database_path(), config.busy_timeout())
    }

    /// Open (or create) a database file
    pub fn new(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        debug!(path = %db_path.display(), "Revision store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Registry documents
        conn.execute(
            "CREATE TABLE IF NOT EXISTS machine_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                line_code TEXT NOT NULL,
                machine_code TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                doc_name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
                created_at INTEGER NOT NULL,
                created_by TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;

        // Revisions (keyed files and registry documents share one shape)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS revisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lineage TEXT NOT NULL,
                kind TEXT,
                scope_type TEXT,
                machine_id INTEGER,
                filename TEXT,
                document_id INTEGER REFERENCES machine_documents(id),
                revision_number INTEGER NOT NULL CHECK (revision_number > 0),
                stored_path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                original_filename TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                created_by TEXT NOT NULL DEFAULT '',
                parent_id INTEGER REFERENCES revisions(id),
                is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
                notes TEXT,
                UNIQUE (lineage, revision_number)
            )",
            [],
        )?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_revisions_single_active
             ON revisions(lineage) WHERE is_active = 1",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_revisions_listing
             ON revisions(kind, scope_type, machine_id, filename)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_revisions_document
             ON revisions(document_id, revision_number)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_revisions_hash
             ON revisions(content_hash)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_machine_documents_line_machine_type
             ON machine_documents(line_code, machine_code, doc_type)",
            [],
        )?;

        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn timestamp(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn revision_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Revision> {
    let token: String = row.get(at + 1)?;
    let lineage = Lineage::from_token(&token)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(at + 1, Type::Text, Box::new(e)))?;

    Ok(Revision {
        id: row.get(at)?,
        lineage,
        revision_number: row.get(at + 2)?,
        stored_path: row.get(at + 3)?,
        content_hash: row.get(at + 4)?,
        original_filename: row.get(at + 5)?,
        created_at: timestamp(row.get(at + 6)?),
        created_by: row.get(at + 7)?,
        parent_id: row.get(at + 8)?,
        is_active: row.get(at + 9)?,
        notes: row.get(at + 10)?,
    })
}

fn document_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<MachineDocument> {
    Ok(MachineDocument {
        id: row.get(at)?,
        line: row.get(at + 1)?,
        machine: row.get(at + 2)?,
        doc_type: row.get(at + 3)?,
        doc_name: row.get(at + 4)?,
        is_active: row.get(at + 5)?,
        created_at: timestamp(row.get(at + 6)?),
        created_by: row.get(at + 7)?,
    })
}

/// `%text%` with LIKE wildcards escaped (`ESCAPE '\'`)
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn search_text(search: &Option<String>) -> Option<&str> {
    search.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared queries (used inside and outside transactions)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn query_revisions(conn: &Connection, lineage: &Lineage) -> Result<Vec<Revision>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM revisions r WHERE r.lineage = ?1 ORDER BY r.revision_number DESC",
        REVISION_COLUMNS
    ))?;
    let revisions = stmt
        .query_map(params![lineage.token()], |row| revision_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(revisions)
}

fn query_revision(conn: &Connection, id: RevisionId) -> Result<Option<Revision>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM revisions r WHERE r.id = ?1", REVISION_COLUMNS),
            params![id],
            |row| revision_from_row(row, 0),
        )
        .optional()?;
    Ok(result)
}

fn query_document(conn: &Connection, id: DocumentId) -> Result<Option<MachineDocument>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM machine_documents d WHERE d.id = ?1", DOCUMENT_COLUMNS),
            params![id],
            |row| document_from_row(row, 0),
        )
        .optional()?;
    Ok(result)
}

fn query_matching_document(
    conn: &Connection,
    line: &str,
    machine: &str,
    doc_type: &str,
    doc_name: &str,
    content_hash: &str,
) -> Result<Option<MachineDocument>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {} FROM machine_documents d
                 WHERE d.line_code = ?1
                   AND d.machine_code = ?2
                   AND d.doc_type = ?3
                   AND d.is_active = 1
                   AND (lower(d.doc_name) = lower(?4)
                        OR EXISTS (
                            SELECT 1 FROM revisions r
                            WHERE r.document_id = d.id AND r.content_hash = ?5
                        ))
                 ORDER BY d.id
                 LIMIT 1",
                DOCUMENT_COLUMNS
            ),
            params![line, machine, doc_type, doc_name.trim(), content_hash],
            |row| document_from_row(row, 0),
        )
        .optional()?;
    Ok(result)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Write transaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds the connection for the whole transaction; rolls back on drop
struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Rollback failed");
            }
        }
    }
}

impl RevisionTx for SqliteTx<'_> {
    fn revisions(&mut self, lineage: &Lineage) -> Result<Vec<Revision>> {
        query_revisions(&self.conn, lineage)
    }

    fn get_revision(&mut self, id: RevisionId) -> Result<Option<Revision>> {
        query_revision(&self.conn, id)
    }

    fn deactivate_all(&mut self, lineage: &Lineage) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE revisions SET is_active = 0 WHERE lineage = ?1 AND is_active = 1",
            params![lineage.token()],
        )?;
        Ok(changed)
    }

    fn activate(&mut self, id: RevisionId) -> Result<()> {
        let changed = self
            .conn
            .execute("UPDATE revisions SET is_active = 1 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::revision_not_found(id));
        }
        Ok(())
    }

    fn insert(&mut self, revision: &NewRevision) -> Result<RevisionId> {
        let key = revision.lineage.key();
        self.conn.execute(
            "INSERT INTO revisions (
                lineage, kind, scope_type, machine_id, filename, document_id,
                revision_number, stored_path, content_hash, original_filename,
                created_at, created_by, parent_id, is_active, notes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14)",
            params![
                revision.lineage.token(),
                key.map(|k| k.kind().as_str()),
                key.map(|k| k.scope().as_str()),
                key.and_then(|k| k.machine()).map(|m| m.get()),
                key.map(|k| k.filename()),
                revision.lineage.document_id(),
                revision.revision_number,
                &revision.stored_path,
                &revision.content_hash,
                &revision.original_filename,
                revision.created_at.timestamp(),
                &revision.created_by,
                revision.parent_id,
                &revision.notes,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_document(&mut self, id: DocumentId) -> Result<Option<MachineDocument>> {
        query_document(&self.conn, id)
    }

    fn find_machine_document(
        &mut self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        content_hash: &str,
    ) -> Result<Option<MachineDocument>> {
        query_matching_document(&self.conn, line, machine, doc_type, doc_name, content_hash)
    }

    fn insert_document(&mut self, document: &NewMachineDocument) -> Result<DocumentId> {
        self.conn.execute(
            "INSERT INTO machine_documents (line_code, machine_code, doc_type, doc_name, is_active, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                &document.line,
                &document.machine,
                &document.doc_type,
                &document.doc_name,
                document.created_at.timestamp(),
                &document.created_by,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn set_document_active(&mut self, id: DocumentId, active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE machine_documents SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(changed > 0)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RevisionStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl RevisionStore for SqliteRevisionStore {
    fn begin(&self) -> Result<Box<dyn RevisionTx + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }

    fn list_revisions(&self, lineage: &Lineage) -> Result<Vec<Revision>> {
        let conn = self.conn.lock();
        query_revisions(&conn, lineage)
    }

    fn get_active(&self, lineage: &Lineage) -> Result<Option<Revision>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM revisions r WHERE r.lineage = ?1 AND r.is_active = 1",
                    REVISION_COLUMNS
                ),
                params![lineage.token()],
                |row| revision_from_row(row, 0),
            )
            .optional()?;
        Ok(result)
    }

    fn get_revision(&self, id: RevisionId) -> Result<Option<Revision>> {
        let conn = self.conn.lock();
        query_revision(&conn, id)
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentSummary>> {
        // One representative row per lineage: the active one, else the newest
        let mut sql = format!(
            "SELECT {}, (SELECT COUNT(*) FROM revisions c WHERE c.lineage = r.lineage)
             FROM revisions r
             WHERE r.kind IS NOT NULL
               AND r.id = (
                   SELECT r2.id FROM revisions r2
                   WHERE r2.lineage = r.lineage
                   ORDER BY r2.is_active DESC, r2.revision_number DESC
                   LIMIT 1
               )",
            REVISION_COLUMNS
        );
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(" AND r.kind = ?");
            values.push(SqlValue::Text(kind.as_str().to_string()));
        }
        if let Some(scope) = filter.scope {
            sql.push_str(" AND r.scope_type = ?");
            values.push(SqlValue::Text(scope.as_str().to_string()));
        }
        match filter.machine {
            MachineFilter::Any => {}
            MachineFilter::Unassigned => sql.push_str(" AND r.machine_id IS NULL"),
            MachineFilter::Only(machine) => {
                sql.push_str(" AND r.machine_id = ?");
                values.push(SqlValue::Integer(machine.get()));
            }
        }
        if !filter.include_inactive {
            sql.push_str(" AND r.is_active = 1");
        }
        if let Some(text) = search_text(&filter.search) {
            sql.push_str(
                " AND (lower(r.filename) LIKE ? ESCAPE '\\'
                   OR EXISTS (
                       SELECT 1 FROM revisions r3
                       WHERE r3.lineage = r.lineage
                         AND lower(COALESCE(r3.notes, '')) LIKE ? ESCAPE '\\'
                   ))",
            );
            let pattern = like_pattern(text);
            values.push(SqlValue::Text(pattern.clone()));
            values.push(SqlValue::Text(pattern));
        }
        sql.push_str(" ORDER BY r.kind, r.scope_type, r.machine_id, lower(r.filename), r.id");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let current = revision_from_row(row, 0)?;
                let count: u32 = row.get(REVISION_COLUMN_COUNT)?;
                Ok((current, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let summaries = rows
            .into_iter()
            .filter_map(|(current, revision_count)| {
                let key = current.lineage.key()?.clone();
                Some(DocumentSummary {
                    key,
                    current,
                    revision_count,
                })
            })
            .collect();
        Ok(summaries)
    }

    fn stored_paths(&self) -> Result<Vec<(RevisionId, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, stored_path FROM revisions ORDER BY id")?;
        let paths = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<MachineDocument>> {
        let conn = self.conn.lock();
        query_document(&conn, id)
    }

    fn list_machine_documents(
        &self,
        filter: &RegistryFilter,
    ) -> Result<Vec<MachineDocumentSummary>> {
        let mut sql = format!(
            "SELECT {}, {}
             FROM machine_documents d
             LEFT JOIN revisions r ON r.id = (
                 SELECT r2.id FROM revisions r2
                 WHERE r2.document_id = d.id
                 ORDER BY r2.is_active DESC, r2.revision_number DESC
                 LIMIT 1
             )
             WHERE 1 = 1",
            DOCUMENT_COLUMNS, REVISION_COLUMNS
        );
        let mut values: Vec<SqlValue> = Vec::new();

        let exact = [
            ("d.line_code", &filter.line),
            ("d.machine_code", &filter.machine),
            ("d.doc_type", &filter.doc_type),
        ];
        for (column, value) in exact {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                sql.push_str(&format!(" AND {} = ?", column));
                values.push(SqlValue::Text(value.to_string()));
            }
        }
        if !filter.include_inactive {
            sql.push_str(" AND d.is_active = 1");
        }
        if let Some(text) = search_text(&filter.search) {
            sql.push_str(
                " AND (lower(d.doc_name) LIKE ? ESCAPE '\\'
                   OR EXISTS (
                       SELECT 1 FROM revisions r3
                       WHERE r3.document_id = d.id
                         AND (lower(r3.original_filename) LIKE ? ESCAPE '\\'
                              OR lower(COALESCE(r3.notes, '')) LIKE ? ESCAPE '\\')
                   ))",
            );
            let pattern = like_pattern(text);
            values.extend(std::iter::repeat(SqlValue::Text(pattern)).take(3));
        }
        sql.push_str(" ORDER BY lower(d.doc_name), d.id");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let summaries = stmt
            .query_map(params_from_iter(values), |row| {
                let document = document_from_row(row, 0)?;
                let revision_id: Option<RevisionId> = row.get(DOCUMENT_COLUMN_COUNT)?;
                let current = match revision_id {
                    Some(_) => Some(revision_from_row(row, DOCUMENT_COLUMN_COUNT)?),
                    None => None,
                };
                Ok(MachineDocumentSummary { document, current })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    fn find_machine_document(
        &self,
        line: &str,
        machine: &str,
        doc_type: &str,
        doc_name: &str,
        content_hash: &str,
    ) -> Result<Option<MachineDocument>> {
        let conn = self.conn.lock();
        query_matching_document(&conn, line, machine, doc_type, doc_name, content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactKind, DocumentKey, MachineRef, ScopeType};
    use crate::error::ErrorKind;
    use chrono::Utc;

    fn key(machine: Option<i64>, filename: &str) -> DocumentKey {
        let machine = machine.map(|m| MachineRef::new(m).unwrap());
        DocumentKey::new(ArtifactKind::Print, ScopeType::Machine, machine, filename).unwrap()
    }

    fn new_revision(lineage: &Lineage, number: u32, hash: &str) -> NewRevision {
        NewRevision {
            lineage: lineage.clone(),
            revision_number: number,
            stored_path: format!("storage/prints/x/rev_{}.pdf", number),
            content_hash: hash.to_string(),
            original_filename: "drawing.pdf".to_string(),
            created_at: Utc::now(),
            created_by: "alice".to_string(),
            parent_id: None,
            notes: None,
        }
    }

    fn insert_committed(store: &SqliteRevisionStore, revision: &NewRevision) -> RevisionId {
        let mut tx = store.begin().unwrap();
        tx.deactivate_all(&revision.lineage).unwrap();
        let id = tx.insert(revision).unwrap();
        tx.commit().unwrap();
        id
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Schema constraints
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_revision_number_unique_per_lineage() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let lineage = Lineage::from(key(Some(7), "drawing"));
        insert_committed(&store, &new_revision(&lineage, 1, "h1"));

        let mut tx = store.begin().unwrap();
        tx.deactivate_all(&lineage).unwrap();
        let err = tx.insert(&new_revision(&lineage, 1, "h2")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_second_active_row_rejected() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let lineage = Lineage::from(key(Some(7), "drawing"));
        insert_committed(&store, &new_revision(&lineage, 1, "h1"));

        // Skipping deactivate_all must not yield two active rows
        let mut tx = store.begin().unwrap();
        let err = tx.insert(&new_revision(&lineage, 2, "h2")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let lineage = Lineage::from(key(None, "drawing"));
        let first = insert_committed(&store, &new_revision(&lineage, 1, "h1"));

        {
            let mut tx = store.begin().unwrap();
            assert_eq!(tx.deactivate_all(&lineage).unwrap(), 1);
            tx.insert(&new_revision(&lineage, 2, "h2")).unwrap();
        }

        let revisions = store.list_revisions(&lineage).unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(store.get_active(&lineage).unwrap().unwrap().id, first);
    }

    #[test]
    fn test_activate_unknown_revision() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        let err = tx.activate(999).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_revisions_newest_first_and_roundtrip() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let lineage = Lineage::from(key(Some(3), "op:10"));
        insert_committed(&store, &new_revision(&lineage, 1, "h1"));
        let mut second = new_revision(&lineage, 2, "h2");
        second.notes = Some("fixed feed".to_string());
        insert_committed(&store, &second);

        let revisions = store.list_revisions(&lineage).unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].revision_number, 2);
        assert_eq!(revisions[0].lineage, lineage);
        assert_eq!(revisions[0].notes.as_deref(), Some("fixed feed"));
        assert!(revisions[0].is_active);
        assert!(!revisions[1].is_active);
    }

    #[test]
    fn test_list_documents_machine_buckets() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        for (machine, name) in [(Some(7), "a"), (Some(8), "b"), (None, "c")] {
            let lineage = Lineage::from(key(machine, name));
            insert_committed(&store, &new_revision(&lineage, 1, name));
        }

        let only_seven = store
            .list_documents(
                &DocumentFilter::default().machine(MachineFilter::Only(MachineRef::new(7).unwrap())),
            )
            .unwrap();
        assert_eq!(only_seven.len(), 1);
        assert_eq!(only_seven[0].key.filename(), "a");

        let unassigned = store
            .list_documents(&DocumentFilter::default().machine(MachineFilter::Unassigned))
            .unwrap();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].key.filename(), "c");

        assert_eq!(store.list_documents(&DocumentFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_list_documents_search_escapes_wildcards() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        for name in ["100%_final", "100 final"] {
            let lineage = Lineage::from(key(Some(1), name));
            insert_committed(&store, &new_revision(&lineage, 1, name));
        }

        let hits = store
            .list_documents(&DocumentFilter::default().search("0%_F"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.filename(), "100%_final");
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(" Ab_c "), "%ab\\_c%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn test_document_roundtrip() {
        let store = SqliteRevisionStore::in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        let id = tx
            .insert_document(&NewMachineDocument {
                line: "L1".into(),
                machine: "M2".into(),
                doc_type: "manual".into(),
                doc_name: "Spindle Manual".into(),
                created_at: Utc::now(),
                created_by: "alice".into(),
            })
            .unwrap();
        assert!(tx.set_document_active(id, false).unwrap());
        assert!(!tx.set_document_active(id + 100, false).unwrap());
        tx.commit().unwrap();

        let document = store.get_document(id).unwrap().unwrap();
        assert_eq!(document.doc_name, "Spindle Manual");
        assert!(!document.is_active);
    }

    #[test]
    fn test_file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/docvault.db");
        let lineage = Lineage::from(key(Some(7), "drawing"));
        {
            let store = SqliteRevisionStore::new(&path, Duration::from_secs(1)).unwrap();
            insert_committed(&store, &new_revision(&lineage, 1, "h1"));
        }
        let store = SqliteRevisionStore::new(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(store.list_revisions(&lineage).unwrap().len(), 1);
        assert_eq!(store.stored_paths().unwrap().len(), 1);
    }
}
