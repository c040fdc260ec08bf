//! Free-text query request and result types.

use super::{EntryId, ScopeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of chunks returned by a query.
pub const DEFAULT_MAX_CHUNKS: usize = 5;

/// A free-text query over the scopes visible to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The query text.
    pub query: String,
    /// Account whose global entries are searched.
    pub account_id: String,
    /// Thread whose entries are searched, if any.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Agent whose entries are searched, if any.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Maximum number of chunks to return.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

const fn default_max_chunks() -> usize {
    DEFAULT_MAX_CHUNKS
}

impl QueryRequest {
    /// Creates a query over an account's global entries.
    #[must_use]
    pub fn new(query: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            account_id: account_id.into(),
            thread_id: None,
            agent_id: None,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }

    /// Also searches a thread's entries.
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Also searches an agent's entries.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the chunk limit.
    #[must_use]
    pub const fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }
}

/// One matching chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Entry the chunk was cut from.
    pub entry_id: EntryId,
    /// Name of that entry.
    pub entry_name: String,
    /// Scope of that entry.
    pub scope: ScopeKind,
    /// Position of the chunk within the entry.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Fraction of query terms found in the chunk (0.0 to 1.0).
    pub score: f32,
}

/// Result of a free-text query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Whether anything in the knowledge base matched.
    pub relevant: bool,
    /// Number of chunks returned.
    pub chunks_found: usize,
    /// Matching chunks, best first.
    pub chunks: Vec<QueryHit>,
}

impl QueryResult {
    /// Builds a result from ranked hits.
    #[must_use]
    pub fn from_hits(chunks: Vec<QueryHit>) -> Self {
        Self {
            relevant: !chunks.is_empty(),
            chunks_found: chunks.len(),
            chunks,
        }
    }
}

/// One chunk of an uploaded document, as listed for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `{entry_id}:{chunk_index}`.
    pub chunk_id: String,
    /// Entry the chunk was cut from.
    pub entry_id: EntryId,
    /// Uploaded file name.
    pub filename: String,
    /// Position of the chunk within the entry.
    pub chunk_index: usize,
    /// Number of chunks the entry splits into.
    pub total_chunks: usize,
    /// Chunk length in characters.
    pub size: usize,
    /// Chunk text.
    pub content: String,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// A recorded free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    /// Log identifier.
    pub id: String,
    /// Account the query ran against.
    pub account_id: String,
    /// Thread searched, if any.
    pub thread_id: Option<String>,
    /// Agent searched, if any.
    pub agent_id: Option<String>,
    /// Query text.
    pub query: String,
    /// Number of chunks returned.
    pub chunks_found: usize,
    /// Whether anything matched.
    pub relevant: bool,
    /// Score of the best chunk.
    pub top_score: Option<f32>,
    /// Time spent answering.
    pub response_time_ms: u64,
    /// When the query ran.
    pub created_at: DateTime<Utc>,
}
