//! Row conversion for entries, processing jobs and query logs.
//!
//! Rows are read into plain structs first and converted afterwards, so a bad
//! enum string in the database degrades to the default variant with a warning
//! instead of failing the whole query.

use crate::models::{
    EntryId, KnowledgeEntry, ProcessingJob, ProcessingStatus, QueryLogEntry, Scope, ScopeKind,
    SourceType, UsageContext,
};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Columns selected for entries, in [`EntryRow::from_row`] order.
pub const ENTRY_COLUMNS: &str = "id, account_id, scope_kind, scope_id, name, description, \
     content, content_tokens, usage_context, is_active, source_type, source_metadata, \
     created_at, updated_at, last_accessed_at";

/// Columns selected for processing jobs, in [`JobRow::from_row`] order.
pub const JOB_COLUMNS: &str = "id, account_id, scope_kind, scope_id, filename, file_path, \
     file_size, mime_type, sha256, status, error_message, entry_id, created_at, completed_at";

/// Columns selected for query logs, in [`QueryLogRow::from_row`] order.
pub const QUERY_LOG_COLUMNS: &str = "id, account_id, thread_id, agent_id, query, chunks_found, \
     relevant, top_score, response_time_ms, created_at";

/// Raw `knowledge_entries` row.
#[derive(Debug)]
pub struct EntryRow {
    id: String,
    account_id: String,
    scope_kind: String,
    scope_id: String,
    name: String,
    description: Option<String>,
    content: String,
    content_tokens: Option<i64>,
    usage_context: String,
    is_active: bool,
    source_type: String,
    source_metadata: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_accessed_at: Option<i64>,
}

impl EntryRow {
    /// Reads a row selected with [`ENTRY_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `rusqlite` error if a column has an unexpected type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            scope_kind: row.get(2)?,
            scope_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            content: row.get(6)?,
            content_tokens: row.get(7)?,
            usage_context: row.get(8)?,
            is_active: row.get(9)?,
            source_type: row.get(10)?,
            source_metadata: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            last_accessed_at: row.get(14)?,
        })
    }

    /// Converts the row into a [`KnowledgeEntry`].
    #[must_use]
    pub fn into_entry(self) -> KnowledgeEntry {
        let scope = build_scope(&self.id, &self.scope_kind, self.account_id, self.scope_id);

        let usage_context = UsageContext::parse(&self.usage_context).unwrap_or_else(|| {
            tracing::warn!(id = %self.id, value = %self.usage_context, "Unknown usage context, using default");
            UsageContext::default()
        });
        let source_type = SourceType::parse(&self.source_type).unwrap_or_default();

        let source_metadata = self
            .source_metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        KnowledgeEntry {
            id: EntryId::new(self.id),
            scope,
            name: self.name,
            description: self.description,
            content: self.content,
            content_tokens: self.content_tokens.and_then(|t| usize::try_from(t).ok()),
            usage_context,
            is_active: self.is_active,
            source_type,
            source_metadata,
            created_at: millis_to_datetime(self.created_at),
            updated_at: millis_to_datetime(self.updated_at),
            last_accessed_at: self.last_accessed_at.map(millis_to_datetime),
        }
    }
}

/// Raw `processing_jobs` row.
#[derive(Debug)]
pub struct JobRow {
    id: String,
    account_id: String,
    scope_kind: String,
    scope_id: String,
    filename: String,
    file_path: String,
    file_size: i64,
    mime_type: String,
    sha256: String,
    status: String,
    error_message: Option<String>,
    entry_id: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl JobRow {
    /// Reads a row selected with [`JOB_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `rusqlite` error if a column has an unexpected type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            scope_kind: row.get(2)?,
            scope_id: row.get(3)?,
            filename: row.get(4)?,
            file_path: row.get(5)?,
            file_size: row.get(6)?,
            mime_type: row.get(7)?,
            sha256: row.get(8)?,
            status: row.get(9)?,
            error_message: row.get(10)?,
            entry_id: row.get(11)?,
            created_at: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }

    /// Converts the row into a [`ProcessingJob`].
    #[must_use]
    pub fn into_job(self) -> ProcessingJob {
        let scope = build_scope(&self.id, &self.scope_kind, self.account_id, self.scope_id);
        let status = ProcessingStatus::parse(&self.status).unwrap_or_else(|| {
            tracing::warn!(id = %self.id, value = %self.status, "Unknown job status, using default");
            ProcessingStatus::default()
        });

        ProcessingJob {
            id: self.id,
            scope,
            filename: self.filename,
            file_path: self.file_path,
            file_size: u64::try_from(self.file_size).unwrap_or(0),
            mime_type: self.mime_type,
            sha256: self.sha256,
            status,
            error_message: self.error_message,
            entry_id: self.entry_id.map(EntryId::new),
            created_at: millis_to_datetime(self.created_at),
            completed_at: self.completed_at.map(millis_to_datetime),
        }
    }
}

/// Raw `query_logs` row.
#[derive(Debug)]
pub struct QueryLogRow {
    id: String,
    account_id: String,
    thread_id: Option<String>,
    agent_id: Option<String>,
    query: String,
    chunks_found: i64,
    relevant: bool,
    top_score: Option<f64>,
    response_time_ms: i64,
    created_at: i64,
}

impl QueryLogRow {
    /// Reads a row selected with [`QUERY_LOG_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `rusqlite` error if a column has an unexpected type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            thread_id: row.get(2)?,
            agent_id: row.get(3)?,
            query: row.get(4)?,
            chunks_found: row.get(5)?,
            relevant: row.get(6)?,
            top_score: row.get(7)?,
            response_time_ms: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    /// Converts the row into a [`QueryLogEntry`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn into_log(self) -> QueryLogEntry {
        QueryLogEntry {
            id: self.id,
            account_id: self.account_id,
            thread_id: self.thread_id,
            agent_id: self.agent_id,
            query: self.query,
            chunks_found: usize::try_from(self.chunks_found).unwrap_or(0),
            relevant: self.relevant,
            top_score: self.top_score.map(|score| score as f32),
            response_time_ms: u64::try_from(self.response_time_ms).unwrap_or(0),
            created_at: millis_to_datetime(self.created_at),
        }
    }
}

/// Converts a stored millisecond timestamp to UTC.
#[must_use]
pub fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn build_scope(id: &str, kind: &str, account_id: String, scope_id: String) -> Scope {
    let kind = ScopeKind::parse(kind).unwrap_or_else(|| {
        tracing::warn!(id, value = kind, "Unknown scope kind, treating as global");
        ScopeKind::Global
    });
    Scope::from_parts(kind, account_id, scope_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn query_entry(conn: &Connection, usage: &str) -> KnowledgeEntry {
        let sql = format!(
            "SELECT 'e1', 'acct', 'thread', 't1', 'Name', NULL, 'Body', 1, '{usage}', 1, \
             'api', '{{\"k\":1}}', 1700000000000, 1700000000001, NULL"
        );
        conn.query_row(&sql, [], EntryRow::from_row)
            .unwrap()
            .into_entry()
    }

    #[test]
    fn test_entry_row_conversion() {
        let conn = Connection::open_in_memory().unwrap();
        let entry = query_entry(&conn, "on_request");

        assert_eq!(entry.scope, Scope::thread("acct", "t1"));
        assert_eq!(entry.usage_context, UsageContext::OnRequest);
        assert_eq!(entry.source_type, SourceType::Api);
        assert_eq!(entry.content_tokens, Some(1));
        assert_eq!(entry.source_metadata, Some(serde_json::json!({"k": 1})));
        assert_eq!(entry.created_at.timestamp_millis(), 1_700_000_000_000);
        assert!(entry.last_accessed_at.is_none());
    }

    #[test]
    fn test_unknown_usage_context_falls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let entry = query_entry(&conn, "sometimes");
        assert_eq!(entry.usage_context, UsageContext::Always);
    }

    #[test]
    fn test_millis_to_datetime() {
        assert_eq!(millis_to_datetime(1_500).timestamp_millis(), 1_500);
    }
}
