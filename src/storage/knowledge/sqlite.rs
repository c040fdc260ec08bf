//! `SQLite` knowledge store.
//!
//! Entries of all three scopes live in one table keyed by
//! `(scope_kind, scope_id)`. Token estimates and `updated_at` are written by
//! triggers (see [`crate::storage::sqlite::SCHEMA_SQL`]), so they change in the
//! same transaction as the statement that touched the row.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::instrument;

use crate::models::{
    DocumentRemoval, EntryId, EntryUpdate, KnowledgeEntry, NewEntry, ProcessingJob,
    ProcessingStatus, QueryLogEntry, Scope, ScopeKey, ScopeStats,
};
use crate::storage::sqlite::{
    ENTRY_COLUMNS, EntryRow, JOB_COLUMNS, JobRow, QUERY_LOG_COLUMNS, QueryLogRow, acquire_lock,
    configure_connection, initialize_schema, record_operation_metrics, status_label,
};
use crate::storage::traits::{KnowledgeStore, ProcessingStore, QueryLogStore};
use crate::{Error, Result, current_timestamp_millis};

const BACKEND: &str = "sqlite";

/// SQLite-based store for knowledge entries, processing jobs and query logs.
pub struct SqliteKnowledgeStore {
    /// Database connection (mutex for interior mutability).
    conn: Mutex<Connection>,
    /// Database file, `None` for in-memory stores.
    db_path: Option<PathBuf>,
}

impl SqliteKnowledgeStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::failed("create_database_dir", e))?;
        }

        let conn = Connection::open(path).map_err(|e| Error::failed("open_database", e))?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Creates an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::failed("open_database_memory", e))?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        configure_connection(&conn)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Returns the database file path, if any.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn fetch_entry(conn: &Connection, id: &str) -> Result<Option<KnowledgeEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM knowledge_entries WHERE id = ?1");
        conn.query_row(&sql, params![id], EntryRow::from_row)
            .optional()
            .map(|row| row.map(EntryRow::into_entry))
            .map_err(|e| Error::failed("get_entry", e))
    }

    fn insert_entry(&self, entry: &NewEntry) -> Result<KnowledgeEntry> {
        let conn = acquire_lock(&self.conn);
        let id = EntryId::generate();
        let now = current_timestamp_millis();
        let metadata = entry
            .source_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::failed("serialize_source_metadata", e))?;

        conn.execute(
            "INSERT INTO knowledge_entries
                (id, account_id, scope_kind, scope_id, name, description, content,
                 usage_context, is_active, source_type, source_metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?11)",
            params![
                id.as_str(),
                entry.scope.account_id(),
                entry.scope.kind().as_str(),
                entry.scope.scope_id(),
                entry.name,
                entry.description,
                entry.content,
                entry.usage_context.as_str(),
                entry.source_type.as_str(),
                metadata,
                now,
            ],
        )
        .map_err(|e| {
            map_write_error("insert_entry", e, || {
                format!(
                    "an entry named '{}' already exists in {}",
                    entry.name,
                    entry.scope.key()
                )
            })
        })?;

        Self::fetch_entry(&conn, id.as_str())?
            .ok_or_else(|| Error::failed("insert_entry", "inserted row could not be read back"))
    }

    fn list_entries(&self, scope: &ScopeKey, include_inactive: bool) -> Result<Vec<KnowledgeEntry>> {
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
             WHERE scope_kind = ?1 AND scope_id = ?2 AND (?3 OR is_active = 1)
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::failed("list_entries", e))?;
        let rows = stmt
            .query_map(
                params![scope.kind.as_str(), scope.id, include_inactive],
                EntryRow::from_row,
            )
            .map_err(|e| Error::failed("list_entries", e))?;

        rows.map(|row| {
            row.map(EntryRow::into_entry)
                .map_err(|e| Error::failed("list_entries", e))
        })
        .collect()
    }

    fn update_entry(&self, id: &EntryId, update: &EntryUpdate) -> Result<Option<KnowledgeEntry>> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::failed("update_entry", e))?;

        if update.is_empty() {
            return Self::fetch_entry(&tx, id.as_str());
        }

        let changed = tx
            .execute(
                "UPDATE knowledge_entries SET
                    name = COALESCE(?2, name),
                    description = CASE
                        WHEN ?3 IS NULL THEN description
                        WHEN trim(?3) = '' THEN NULL
                        ELSE ?3
                    END,
                    content = COALESCE(?4, content),
                    usage_context = COALESCE(?5, usage_context),
                    is_active = COALESCE(?6, is_active)
                 WHERE id = ?1",
                params![
                    id.as_str(),
                    update.name,
                    update.description,
                    update.content,
                    update.usage_context.map(|u| u.as_str()),
                    update.is_active,
                ],
            )
            .map_err(|e| {
                map_write_error("update_entry", e, || {
                    format!(
                        "an entry named '{}' already exists in this scope",
                        update.name.as_deref().unwrap_or_default()
                    )
                })
            })?;

        if changed == 0 {
            return Ok(None);
        }

        let entry = Self::fetch_entry(&tx, id.as_str())?;
        tx.commit().map_err(|e| Error::failed("update_entry", e))?;
        Ok(entry)
    }

    fn delete_entry(&self, id: &EntryId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute(
                "DELETE FROM knowledge_entries WHERE id = ?1",
                params![id.as_str()],
            )
            .map_err(|e| Error::failed("delete_entry", e))?;
        Ok(deleted > 0)
    }

    fn delete_where(
        &self,
        operation: &'static str,
        tables: &[&str],
        clause: &str,
        args: &[&str],
    ) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::failed(operation, e))?;

        let removed = purge(&tx, tables, clause, args).map_err(|e| Error::failed(operation, e))?;

        tx.commit().map_err(|e| Error::failed(operation, e))?;
        Ok(removed)
    }

    fn delete_document_rows(&self, scope: &Scope, filename: &str) -> Result<DocumentRemoval> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::failed("delete_document", e))?;
        let (account_id, kind, scope_id) = (scope.account_id(), scope.kind().as_str(), scope.scope_id());

        let entries_deleted = tx
            .execute(
                "DELETE FROM knowledge_entries
                 WHERE account_id = ?1 AND scope_kind = ?2 AND scope_id = ?3
                   AND source_type = 'file_upload'
                   AND CASE WHEN json_valid(source_metadata)
                       THEN json_extract(source_metadata, '$.filename') END = ?4",
                params![account_id, kind, scope_id, filename],
            )
            .map_err(|e| Error::failed("delete_document", e))?;
        let jobs_deleted = tx
            .execute(
                "DELETE FROM processing_jobs
                 WHERE account_id = ?1 AND scope_kind = ?2 AND scope_id = ?3 AND filename = ?4",
                params![account_id, kind, scope_id, filename],
            )
            .map_err(|e| Error::failed("delete_document", e))?;

        tx.commit().map_err(|e| Error::failed("delete_document", e))?;
        Ok(DocumentRemoval {
            filename: filename.to_string(),
            entries_deleted,
            jobs_deleted,
        })
    }

    fn insert_query_log(&self, entry: &QueryLogEntry) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO query_logs
                (id, account_id, thread_id, agent_id, query, chunks_found, relevant,
                 top_score, response_time_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id,
                entry.account_id,
                entry.thread_id,
                entry.agent_id,
                entry.query,
                i64::try_from(entry.chunks_found).unwrap_or(i64::MAX),
                entry.relevant,
                entry.top_score.map(f64::from),
                i64::try_from(entry.response_time_ms).unwrap_or(i64::MAX),
                entry.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| Error::failed("record_query", e))?;
        Ok(())
    }

    fn list_query_logs(&self, account_id: &str, limit: usize) -> Result<Vec<QueryLogEntry>> {
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT {QUERY_LOG_COLUMNS} FROM query_logs
             WHERE account_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::failed("recent_queries", e))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![account_id, limit], QueryLogRow::from_row)
            .map_err(|e| Error::failed("recent_queries", e))?;

        rows.map(|row| {
            row.map(QueryLogRow::into_log)
                .map_err(|e| Error::failed("recent_queries", e))
        })
        .collect()
    }

    fn touch_entries(&self, ids: &[EntryId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::failed("touch_entries", e))?;
        let now = current_timestamp_millis();
        {
            let mut stmt = tx
                .prepare("UPDATE knowledge_entries SET last_accessed_at = ?1 WHERE id = ?2")
                .map_err(|e| Error::failed("touch_entries", e))?;
            for id in ids {
                stmt.execute(params![now, id.as_str()])
                    .map_err(|e| Error::failed("touch_entries", e))?;
            }
        }
        tx.commit().map_err(|e| Error::failed("touch_entries", e))
    }

    fn scope_stats(&self, scope: &ScopeKey) -> Result<ScopeStats> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(is_active), 0),
                COALESCE(SUM(CASE WHEN is_active = 1 AND usage_context <> 'on_request'
                             THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_active = 1 THEN content_tokens ELSE 0 END), 0)
             FROM knowledge_entries
             WHERE scope_kind = ?1 AND scope_id = ?2",
            params![scope.kind.as_str(), scope.id],
            |row| {
                let count = |idx: usize| -> rusqlite::Result<usize> {
                    let value: i64 = row.get(idx)?;
                    Ok(usize::try_from(value).unwrap_or(0))
                };
                Ok(ScopeStats {
                    total_entries: count(0)?,
                    active_entries: count(1)?,
                    assembled_entries: count(2)?,
                    active_tokens: count(3)?,
                })
            },
        )
        .map_err(|e| Error::failed("scope_stats", e))
    }

    fn list_job_rows(&self, scope: &ScopeKey) -> Result<Vec<ProcessingJob>> {
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs
             WHERE scope_kind = ?1 AND scope_id = ?2
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::failed("list_jobs", e))?;
        let rows = stmt
            .query_map(params![scope.kind.as_str(), scope.id], JobRow::from_row)
            .map_err(|e| Error::failed("list_jobs", e))?;

        rows.map(|row| {
            row.map(JobRow::into_job)
                .map_err(|e| Error::failed("list_jobs", e))
        })
        .collect()
    }
}

/// Maps a write error, turning constraint violations into domain errors.
fn map_write_error(
    operation: &str,
    err: rusqlite::Error,
    conflict_message: impl FnOnce() -> String,
) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, detail) = &err {
        match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => return Error::Conflict(conflict_message()),
            rusqlite::ffi::SQLITE_CONSTRAINT_CHECK | rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => {
                return Error::InvalidInput(
                    detail
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                );
            },
            _ => {},
        }
    }
    Error::failed(operation, err)
}

/// Tables cleared when a scope is deleted; entries last.
const SCOPE_TABLES: &[&str] = &["processing_jobs", "knowledge_entries"];

/// Tables cleared when an account is deleted; entries last.
const ACCOUNT_TABLES: &[&str] = &["query_logs", "processing_jobs", "knowledge_entries"];

/// Deletes rows matching `clause` from each table in order.
///
/// Returns the number of rows removed from the last table.
fn purge(tx: &Transaction<'_>, tables: &[&str], clause: &str, args: &[&str]) -> rusqlite::Result<usize> {
    let mut removed = 0;
    for table in tables {
        let params = rusqlite::params_from_iter(args.iter());
        removed = tx.execute(&format!("DELETE FROM {table} WHERE {clause}"), params)?;
    }
    Ok(removed)
}

impl KnowledgeStore for SqliteKnowledgeStore {
    #[instrument(
        skip(self, entry),
        fields(operation = "insert", backend = BACKEND, scope = %entry.scope.key())
    )]
    fn insert(&self, entry: &NewEntry) -> Result<KnowledgeEntry> {
        let start = Instant::now();
        let result = self.insert_entry(entry);
        record_operation_metrics(BACKEND, "insert", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "get", backend = BACKEND, entry_id = %id))]
    fn get(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            Self::fetch_entry(&conn, id.as_str())
        };
        record_operation_metrics(BACKEND, "get", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "list", backend = BACKEND, scope = %scope))]
    fn list(&self, scope: &ScopeKey, include_inactive: bool) -> Result<Vec<KnowledgeEntry>> {
        let start = Instant::now();
        let result = self.list_entries(scope, include_inactive);
        record_operation_metrics(BACKEND, "list", start, status_label(&result));
        result
    }

    #[instrument(skip(self, update), fields(operation = "update", backend = BACKEND, entry_id = %id))]
    fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<Option<KnowledgeEntry>> {
        let start = Instant::now();
        let result = self.update_entry(id, update);
        record_operation_metrics(BACKEND, "update", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "delete", backend = BACKEND, entry_id = %id))]
    fn delete(&self, id: &EntryId) -> Result<bool> {
        let start = Instant::now();
        let result = self.delete_entry(id);
        record_operation_metrics(BACKEND, "delete", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "delete_scope", backend = BACKEND, scope = %scope))]
    fn delete_scope(&self, scope: &ScopeKey) -> Result<usize> {
        let start = Instant::now();
        let result = self.delete_where(
            "delete_scope",
            SCOPE_TABLES,
            "scope_kind = ?1 AND scope_id = ?2",
            &[scope.kind.as_str(), scope.id.as_str()],
        );
        record_operation_metrics(BACKEND, "delete_scope", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "delete_account", backend = BACKEND))]
    fn delete_account(&self, account_id: &str) -> Result<usize> {
        let start = Instant::now();
        let result = self.delete_where("delete_account", ACCOUNT_TABLES, "account_id = ?1", &[account_id]);
        record_operation_metrics(BACKEND, "delete_account", start, status_label(&result));
        result
    }

    #[instrument(
        skip(self),
        fields(operation = "delete_document", backend = BACKEND, scope = %scope.key())
    )]
    fn delete_document(&self, scope: &Scope, filename: &str) -> Result<DocumentRemoval> {
        let start = Instant::now();
        let result = self.delete_document_rows(scope, filename);
        record_operation_metrics(BACKEND, "delete_document", start, status_label(&result));
        result
    }

    #[instrument(skip(self, ids), fields(operation = "touch", backend = BACKEND, count = ids.len()))]
    fn touch(&self, ids: &[EntryId]) -> Result<()> {
        let start = Instant::now();
        let result = self.touch_entries(ids);
        record_operation_metrics(BACKEND, "touch", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "stats", backend = BACKEND, scope = %scope))]
    fn stats(&self, scope: &ScopeKey) -> Result<ScopeStats> {
        let start = Instant::now();
        let result = self.scope_stats(scope);
        record_operation_metrics(BACKEND, "stats", start, status_label(&result));
        result
    }
}

impl ProcessingStore for SqliteKnowledgeStore {
    #[instrument(skip(self, job), fields(operation = "create_job", backend = BACKEND, job_id = %job.id))]
    fn create_job(&self, job: &ProcessingJob) -> Result<()> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO processing_jobs
                    (id, account_id, scope_kind, scope_id, filename, file_path, file_size,
                     mime_type, sha256, status, error_message, entry_id, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    job.id,
                    job.scope.account_id(),
                    job.scope.kind().as_str(),
                    job.scope.scope_id(),
                    job.filename,
                    job.file_path,
                    i64::try_from(job.file_size).unwrap_or(i64::MAX),
                    job.mime_type,
                    job.sha256,
                    job.status.as_str(),
                    job.error_message,
                    job.entry_id.as_ref().map(EntryId::as_str),
                    job.created_at.timestamp_millis(),
                    job.completed_at.map(|t| t.timestamp_millis()),
                ],
            )
            .map(|_| ())
            .map_err(|e| {
                map_write_error("create_job", e, || format!("job '{}' already exists", job.id))
            })
        };
        record_operation_metrics(BACKEND, "create_job", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "get_job", backend = BACKEND))]
    fn get_job(&self, id: &str) -> Result<Option<ProcessingJob>> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            let sql = format!("SELECT {JOB_COLUMNS} FROM processing_jobs WHERE id = ?1");
            conn.query_row(&sql, params![id], JobRow::from_row)
                .optional()
                .map(|row| row.map(JobRow::into_job))
                .map_err(|e| Error::failed("get_job", e))
        };
        record_operation_metrics(BACKEND, "get_job", start, status_label(&result));
        result
    }

    #[instrument(
        skip(self, error_message, entry_id),
        fields(operation = "set_job_status", backend = BACKEND, status = %status)
    )]
    fn set_job_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        error_message: Option<&str>,
        entry_id: Option<&EntryId>,
    ) -> Result<bool> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            let completed_at = status.is_terminal().then(current_timestamp_millis);
            conn.execute(
                "UPDATE processing_jobs SET
                    status = ?2,
                    error_message = COALESCE(?3, error_message),
                    entry_id = COALESCE(?4, entry_id),
                    completed_at = COALESCE(?5, completed_at)
                 WHERE id = ?1",
                params![
                    id,
                    status.as_str(),
                    error_message,
                    entry_id.map(EntryId::as_str),
                    completed_at,
                ],
            )
            .map(|changed| changed > 0)
            .map_err(|e| Error::failed("set_job_status", e))
        };
        record_operation_metrics(BACKEND, "set_job_status", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "list_jobs", backend = BACKEND, scope = %scope))]
    fn list_jobs(&self, scope: &ScopeKey) -> Result<Vec<ProcessingJob>> {
        let start = Instant::now();
        let result = self.list_job_rows(scope);
        record_operation_metrics(BACKEND, "list_jobs", start, status_label(&result));
        result
    }
}

impl QueryLogStore for SqliteKnowledgeStore {
    #[instrument(skip(self, entry), fields(operation = "record_query", backend = BACKEND))]
    fn record_query(&self, entry: &QueryLogEntry) -> Result<()> {
        let start = Instant::now();
        let result = self.insert_query_log(entry);
        record_operation_metrics(BACKEND, "record_query", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "recent_queries", backend = BACKEND))]
    fn recent_queries(&self, account_id: &str, limit: usize) -> Result<Vec<QueryLogEntry>> {
        let start = Instant::now();
        let result = self.list_query_logs(account_id, limit);
        record_operation_metrics(BACKEND, "recent_queries", start, status_label(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceType, UsageContext};
    use chrono::{Duration, Utc};

    fn create_test_store() -> SqliteKnowledgeStore {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("kbase_test.db");
        // Keep the directory alive for the duration of the test.
        std::mem::forget(dir);
        SqliteKnowledgeStore::new(&path).expect("Failed to create test store")
    }

    fn insert(store: &SqliteKnowledgeStore, scope: Scope, name: &str, content: &str) -> KnowledgeEntry {
        store
            .insert(&NewEntry::new(scope, name, content))
            .expect("insert failed")
    }

    #[test]
    fn test_insert_computes_tokens() {
        let store = create_test_store();
        let entry = insert(&store, Scope::global("acct"), "Style", &"x".repeat(41));

        assert_eq!(entry.content_tokens, Some(10));
        assert_eq!(entry.created_at, entry.updated_at);
        assert!(entry.is_active);
        assert_eq!(entry.source_type, SourceType::Manual);
    }

    #[test]
    fn test_tokens_count_characters_not_bytes() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = insert(&store, Scope::global("acct"), "Unicode", "éééééééé");
        assert_eq!(entry.content_tokens, Some(2));
    }

    #[test]
    fn test_duplicate_name_is_conflict() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        insert(&store, Scope::thread("acct", "t1"), "Notes", "one");

        let result = store.insert(&NewEntry::new(Scope::thread("acct", "t1"), "Notes", "two"));
        assert!(matches!(result, Err(Error::Conflict(_))));

        // Same name in another scope is fine.
        insert(&store, Scope::thread("acct", "t2"), "Notes", "three");
    }

    #[test]
    fn test_blank_content_rejected_by_store() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let result = store.insert(&NewEntry::new(Scope::global("acct"), "Blank", "   "));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_list_newest_first_with_tiebreak() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::agent("acct", "bot");
        for name in ["a", "b", "c"] {
            insert(&store, scope.clone(), name, "content");
        }

        let names: Vec<_> = store
            .list(&scope.key(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_list_filters_inactive() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::global("acct");
        let entry = insert(&store, scope.clone(), "Old", "content");
        insert(&store, scope.clone(), "New", "content");

        let update = EntryUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        store.update(&entry.id, &update).unwrap();

        assert_eq!(store.list(&scope.key(), false).unwrap().len(), 1);
        assert_eq!(store.list(&scope.key(), true).unwrap().len(), 2);
    }

    #[test]
    fn test_description_update_keeps_tokens_and_advances_updated_at() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = insert(&store, Scope::global("acct"), "Doc", &"y".repeat(100));

        let update = EntryUpdate {
            description: Some("Now described".to_string()),
            ..Default::default()
        };
        let updated = store.update(&entry.id, &update).unwrap().unwrap();

        assert_eq!(updated.content_tokens, Some(25));
        assert_eq!(updated.description.as_deref(), Some("Now described"));
        assert!(updated.updated_at > entry.updated_at);
    }

    #[test]
    fn test_content_update_recomputes_tokens() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = insert(&store, Scope::global("acct"), "Doc", "short");

        let update = EntryUpdate {
            content: Some("z".repeat(80)),
            usage_context: Some(UsageContext::OnRequest),
            ..Default::default()
        };
        let updated = store.update(&entry.id, &update).unwrap().unwrap();

        assert_eq!(updated.content_tokens, Some(20));
        assert_eq!(updated.usage_context, UsageContext::OnRequest);
    }

    #[test]
    fn test_empty_description_clears() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = store
            .insert(&NewEntry::new(Scope::global("acct"), "Doc", "body").with_description("desc"))
            .unwrap();

        let update = EntryUpdate {
            description: Some("  ".to_string()),
            ..Default::default()
        };
        let updated = store.update(&entry.id, &update).unwrap().unwrap();
        assert!(updated.description.is_none());
    }

    #[test]
    fn test_update_missing_entry() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let update = EntryUpdate {
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert!(store.update(&EntryId::new("missing"), &update).unwrap().is_none());
    }

    #[test]
    fn test_rename_into_taken_name_is_conflict() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::global("acct");
        insert(&store, scope.clone(), "Taken", "one");
        let other = insert(&store, scope, "Free", "two");

        let update = EntryUpdate {
            name: Some("Taken".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(&other.id, &update),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_touch_does_not_change_updated_at() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = insert(&store, Scope::global("acct"), "Doc", "body");

        store.touch(std::slice::from_ref(&entry.id)).unwrap();
        let touched = store.get(&entry.id).unwrap().unwrap();

        assert!(touched.last_accessed_at.is_some());
        assert_eq!(touched.updated_at, entry.updated_at);
    }

    #[test]
    fn test_delete_scope_and_account_cascade() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        insert(&store, Scope::global("acct"), "G", "body");
        insert(&store, Scope::thread("acct", "t1"), "T1", "body");
        insert(&store, Scope::thread("acct", "t1"), "T2", "body");
        insert(&store, Scope::agent("acct", "a1"), "A", "body");
        insert(&store, Scope::global("other"), "G", "body");

        assert_eq!(store.delete_scope(&ScopeKey::thread("t1")).unwrap(), 2);
        assert_eq!(store.delete_account("acct").unwrap(), 2);
        assert_eq!(store.list(&ScopeKey::global("other"), true).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_entry() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let entry = insert(&store, Scope::global("acct"), "Doc", "body");
        assert!(store.delete(&entry.id).unwrap());
        assert!(!store.delete(&entry.id).unwrap());
        assert!(!store.exists(&entry.id).unwrap());
    }

    #[test]
    fn test_stats() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::global("acct");
        insert(&store, scope.clone(), "A", &"a".repeat(40));
        store
            .insert(
                &NewEntry::new(scope.clone(), "B", "b".repeat(20))
                    .with_usage_context(UsageContext::OnRequest),
            )
            .unwrap();

        let stats = store.stats(&scope.key()).unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.active_entries, 2);
        assert_eq!(stats.assembled_entries, 1);
        assert_eq!(stats.active_tokens, 15);
    }

    fn job(id: &str, scope: &Scope, filename: &str) -> ProcessingJob {
        ProcessingJob {
            id: id.to_string(),
            scope: scope.clone(),
            filename: filename.to_string(),
            file_path: format!("uploads/{id}/{filename}"),
            file_size: 12,
            mime_type: "text/plain".to_string(),
            sha256: "abc".to_string(),
            status: ProcessingStatus::Pending,
            error_message: None,
            entry_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn insert_upload(store: &SqliteKnowledgeStore, scope: &Scope, name: &str, filename: &str) {
        store
            .insert(
                &NewEntry::new(scope.clone(), name, "extracted text")
                    .with_source_type(SourceType::FileUpload)
                    .with_source_metadata(serde_json::json!({ "filename": filename })),
            )
            .expect("insert failed");
    }

    #[test]
    fn test_job_lifecycle() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::thread("acct", "t1");
        store.create_job(&job("job-1", &scope, "notes.txt")).unwrap();

        let entry = insert(&store, scope.clone(), "notes.txt", "hello");
        assert!(
            store
                .set_job_status("job-1", ProcessingStatus::Completed, None, Some(&entry.id))
                .unwrap()
        );

        let fetched = store.get_job("job-1").unwrap().unwrap();
        assert_eq!(fetched.status, ProcessingStatus::Completed);
        assert_eq!(fetched.entry_id, Some(entry.id.clone()));
        assert!(fetched.completed_at.is_some());
        assert_eq!(store.list_jobs(&scope.key()).unwrap().len(), 1);

        // Deleting the entry unlinks the job.
        store.delete(&entry.id).unwrap();
        assert!(store.get_job("job-1").unwrap().unwrap().entry_id.is_none());

        assert!(
            !store
                .set_job_status("missing", ProcessingStatus::Failed, Some("x"), None)
                .unwrap()
        );
    }

    #[test]
    fn test_delete_document_removes_uploads_and_jobs() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let scope = Scope::global("acct");
        insert_upload(&store, &scope, "report.pdf", "report.pdf");
        insert_upload(&store, &scope, "report.pdf (20240101120000000)", "report.pdf");
        insert_upload(&store, &scope, "other.pdf", "other.pdf");
        insert_upload(&store, &Scope::thread("acct", "t1"), "report.pdf", "report.pdf");
        insert(&store, scope.clone(), "Manual", "typed by hand");
        store.create_job(&job("job-1", &scope, "report.pdf")).unwrap();
        store.create_job(&job("job-2", &scope, "report.pdf")).unwrap();

        let removal = store.delete_document(&scope, "report.pdf").unwrap();
        assert_eq!(removal.entries_deleted, 2);
        assert_eq!(removal.jobs_deleted, 2);

        let names: Vec<_> = store
            .list(&scope.key(), true)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Manual", "other.pdf"]);
        assert_eq!(store.list(&ScopeKey::thread("t1"), true).unwrap().len(), 1);

        let again = store.delete_document(&scope, "report.pdf").unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_query_log_newest_first() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let now = Utc::now();
        for (i, query) in ["first", "second", "third"].iter().enumerate() {
            store
                .record_query(&QueryLogEntry {
                    id: format!("q{i}"),
                    account_id: "acct".to_string(),
                    thread_id: Some("t1".to_string()),
                    agent_id: None,
                    query: (*query).to_string(),
                    chunks_found: i,
                    relevant: i > 0,
                    top_score: (i > 0).then_some(0.5),
                    response_time_ms: 3,
                    created_at: now + Duration::milliseconds(i64::try_from(i).unwrap()),
                })
                .unwrap();
        }

        let logs = store.recent_queries("acct", 2).unwrap();
        let queries: Vec<_> = logs.iter().map(|l| l.query.as_str()).collect();
        assert_eq!(queries, vec!["third", "second"]);
        assert_eq!(logs[0].top_score, Some(0.5));
        assert_eq!(logs[0].thread_id.as_deref(), Some("t1"));
        assert!(store.recent_queries("other", 10).unwrap().is_empty());

        store.delete_account("acct").unwrap();
        assert!(store.recent_queries("acct", 10).unwrap().is_empty());
    }
}
