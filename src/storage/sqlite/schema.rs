//! Schema for the knowledge store.
//!
//! All three scopes share `knowledge_entries`, discriminated by `scope_kind`.
//! Token estimates and `updated_at` are maintained by triggers so they are
//! written in the same transaction as the statement that changes the row;
//! values supplied by callers are overwritten.
//!
//! Thread and agent ids are globally unique, so entry names are unique per
//! `(scope_kind, scope_id)` without the account.
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | entries, processing jobs, triggers |
//! | 2 | `query_logs` |

use crate::{Error, Result};
use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// Table, index and trigger definitions.
///
/// `length()` on TEXT counts characters, so `length(content) / 4` matches
/// [`crate::services::estimate_tokens`]. The update trigger only watches the
/// user-editable columns; `last_accessed_at` changes leave `updated_at` alone.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS knowledge_entries (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    scope_kind TEXT NOT NULL CHECK (scope_kind IN ('global', 'thread', 'agent')),
    scope_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    content TEXT NOT NULL CHECK (length(trim(content)) > 0),
    content_tokens INTEGER,
    usage_context TEXT NOT NULL DEFAULT 'always'
        CHECK (usage_context IN ('always', 'contextual', 'on_request')),
    is_active INTEGER NOT NULL DEFAULT 1,
    source_type TEXT NOT NULL DEFAULT 'manual'
        CHECK (source_type IN ('manual', 'file_upload', 'api')),
    source_metadata TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_accessed_at INTEGER,
    UNIQUE (scope_kind, scope_id, name),
    CHECK (scope_kind <> 'global' OR scope_id = account_id)
);

CREATE INDEX IF NOT EXISTS idx_entries_scope_created
    ON knowledge_entries(scope_kind, scope_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_entries_account
    ON knowledge_entries(account_id);

CREATE TRIGGER IF NOT EXISTS knowledge_entries_tokens_on_insert
AFTER INSERT ON knowledge_entries
BEGIN
    UPDATE knowledge_entries
    SET content_tokens = length(NEW.content) / 4
    WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS knowledge_entries_touch_on_update
AFTER UPDATE OF name, description, content, usage_context, is_active, source_metadata
ON knowledge_entries
BEGIN
    UPDATE knowledge_entries
    SET content_tokens = CASE
            WHEN NEW.content IS NOT OLD.content THEN length(NEW.content) / 4
            ELSE OLD.content_tokens
        END,
        updated_at = MAX(
            CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER),
            OLD.updated_at + 1
        )
    WHERE id = NEW.id;
END;

CREATE TABLE IF NOT EXISTS processing_jobs (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    scope_kind TEXT NOT NULL CHECK (scope_kind IN ('global', 'thread', 'agent')),
    scope_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    error_message TEXT,
    entry_id TEXT REFERENCES knowledge_entries(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_jobs_scope
    ON processing_jobs(scope_kind, scope_id, created_at DESC);

CREATE TABLE IF NOT EXISTS query_logs (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    thread_id TEXT,
    agent_id TEXT,
    query TEXT NOT NULL,
    chunks_found INTEGER NOT NULL,
    relevant INTEGER NOT NULL,
    top_score REAL,
    response_time_ms INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_logs_account
    ON query_logs(account_id, created_at DESC);
";

/// Creates tables, indexes and triggers if they do not exist yet.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the schema cannot be applied or the
/// database was written by a newer schema version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::failed("read_schema_version", e))?;

    if version > SCHEMA_VERSION {
        return Err(Error::failed(
            "initialize_schema",
            format!("database schema version {version} is newer than supported {SCHEMA_VERSION}"),
        ));
    }

    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| Error::failed("initialize_schema", e))?;

    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| Error::failed("write_schema_version", e))?;
        tracing::info!(version = SCHEMA_VERSION, "Applied knowledge store schema");
    }

    Ok(())
}
