//! Free-text query over the entries visible to a conversation.
//!
//! Entries are chunked the same way uploads are, and each chunk is scored by
//! the fraction of distinct query terms it contains. The entry name counts
//! as part of every chunk, so a query naming an entry finds all of it.
//!
//! Every answered query is written to the query log. A failed log write is
//! reported as a warning and does not fail the query.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

use crate::models::{
    DocumentChunk, EntryId, KnowledgeEntry, QueryHit, QueryLogEntry, QueryRequest, QueryResult,
    ScopeKey, SourceType,
};
use crate::services::DocumentProcessor;
use crate::services::entries::{require_id, validate_scope_key};
use crate::storage::{KnowledgeStore, QueryLogStore};
use crate::{Error, Result};

/// Runs of letters and digits.
static TERM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap_or_else(|_| unreachable!()));

/// Words too common to say anything about relevance.
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for",
    "from", "has", "have", "how", "i", "if", "in", "is", "it", "its", "me", "my", "of", "on",
    "or", "our", "so", "that", "the", "their", "there", "this", "to", "was", "we", "what",
    "when", "where", "which", "who", "why", "will", "with", "you", "your",
];

/// Service answering free-text queries.
pub struct QueryService {
    store: Arc<dyn KnowledgeStore>,
    logs: Arc<dyn QueryLogStore>,
    processor: DocumentProcessor,
}

impl QueryService {
    /// Creates a query service.
    #[must_use]
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        logs: Arc<dyn QueryLogStore>,
        processor: DocumentProcessor,
    ) -> Self {
        Self {
            store,
            logs,
            processor,
        }
    }

    /// Finds the chunks best matching a query.
    ///
    /// Searches the active entries of the account's global scope and, when
    /// given, the thread and agent scopes. `on_request` entries are included.
    /// Entries that produced a hit are marked as accessed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank query or account id, and
    /// an error if the store fails.
    #[instrument(skip(self, request), fields(account_id = %request.account_id, max_chunks = request.max_chunks))]
    pub fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidInput("query cannot be empty".to_string()));
        }

        let scopes = scopes_for(request);
        for scope in &scopes {
            validate_scope_key(scope)?;
        }

        let start = Instant::now();
        let result = self.search(request, &scopes)?;
        self.log_query(request, &result, start);
        Ok(result)
    }

    fn search(&self, request: &QueryRequest, scopes: &[ScopeKey]) -> Result<QueryResult> {
        let terms = query_terms(&request.query);
        if terms.is_empty() || request.max_chunks == 0 {
            return Ok(QueryResult::default());
        }

        let mut entries = Vec::new();
        for scope in scopes {
            entries.extend(self.store.list(scope, false)?);
        }
        // Newest first so the stable sort below breaks score ties by recency.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut hits: Vec<QueryHit> = entries
            .iter()
            .flat_map(|entry| self.score_entry(entry, &terms))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(request.max_chunks);

        let mut touched: Vec<EntryId> = Vec::new();
        for hit in &hits {
            if !touched.contains(&hit.entry_id) {
                touched.push(hit.entry_id.clone());
            }
        }
        if !touched.is_empty() {
            self.store.touch(&touched)?;
        }

        metrics::counter!(
            "queries_total",
            "relevant" => if hits.is_empty() { "false" } else { "true" }
        )
        .increment(1);
        tracing::debug!(terms = terms.len(), hits = hits.len(), "Answered query");

        Ok(QueryResult::from_hits(hits))
    }

    fn log_query(&self, request: &QueryRequest, result: &QueryResult, start: Instant) {
        let entry = QueryLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: request.account_id.clone(),
            thread_id: request.thread_id.clone(),
            agent_id: request.agent_id.clone(),
            query: request.query.clone(),
            chunks_found: result.chunks_found,
            relevant: result.relevant,
            top_score: result.chunks.first().map(|hit| hit.score),
            response_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        };
        if let Err(e) = self.logs.record_query(&entry) {
            tracing::warn!(error = %e, "Failed to record query log");
        }
    }

    /// Lists an account's most recent queries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank account id, and an error
    /// if the store fails.
    pub fn recent_queries(&self, account_id: &str, limit: usize) -> Result<Vec<QueryLogEntry>> {
        require_id("account_id", account_id)?;
        self.logs.recent_queries(account_id, limit)
    }

    /// Lists the chunks of a scope's uploaded documents.
    ///
    /// Covers active file-upload entries, newest first, each split the way
    /// uploads are. With a query, only chunks containing at least one query
    /// term are kept. At most `limit` chunks are returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid scope, and an error if
    /// the store fails.
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn document_chunks(
        &self,
        scope: &ScopeKey,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        validate_scope_key(scope)?;
        let terms = query.map(query_terms).unwrap_or_default();

        let mut chunks = Vec::new();
        if limit == 0 {
            return Ok(chunks);
        }

        let documents = self
            .store
            .list(scope, false)?
            .into_iter()
            .filter(|entry| entry.source_type == SourceType::FileUpload);
        for entry in documents {
            let filename = entry
                .source_metadata
                .as_ref()
                .and_then(|m| m.get("filename"))
                .and_then(|f| f.as_str())
                .map_or_else(|| entry.name.clone(), str::to_string);
            let pieces = self.processor.chunk(&entry.content);
            let total_chunks = pieces.len();

            for piece in pieces {
                if !terms.is_empty() {
                    let present = term_set(&piece.text);
                    if !terms.iter().any(|t| present.contains(t)) {
                        continue;
                    }
                }
                chunks.push(DocumentChunk {
                    chunk_id: format!("{}:{}", entry.id, piece.index),
                    entry_id: entry.id.clone(),
                    filename: filename.clone(),
                    chunk_index: piece.index,
                    total_chunks,
                    size: piece.text.chars().count(),
                    content: piece.text,
                    created_at: entry.created_at,
                });
                if chunks.len() == limit {
                    return Ok(chunks);
                }
            }
        }
        Ok(chunks)
    }

    fn score_entry(&self, entry: &KnowledgeEntry, terms: &[String]) -> Vec<QueryHit> {
        let name_terms: HashSet<String> = term_set(&entry.name);

        self.processor
            .chunk(&entry.content)
            .into_iter()
            .filter_map(|chunk| {
                let mut present = term_set(&chunk.text);
                present.extend(name_terms.iter().cloned());
                let score = term_coverage(terms, &present);
                (score > 0.0).then(|| QueryHit {
                    entry_id: entry.id.clone(),
                    entry_name: entry.name.clone(),
                    scope: entry.scope.kind(),
                    chunk_index: chunk.index,
                    text: chunk.text,
                    score,
                })
            })
            .collect()
    }
}

fn scopes_for(request: &QueryRequest) -> Vec<ScopeKey> {
    let mut scopes = vec![ScopeKey::global(request.account_id.as_str())];
    if let Some(thread_id) = &request.thread_id {
        scopes.push(ScopeKey::thread(thread_id.as_str()));
    }
    if let Some(agent_id) = &request.agent_id {
        scopes.push(ScopeKey::agent(agent_id.as_str()));
    }
    scopes
}

/// Extracts the distinct search terms of a query, in order of appearance.
///
/// Terms are lower-cased runs of letters and digits at least two characters
/// long, minus stop words.
///
/// ```rust
/// use kbase::services::query_terms;
///
/// assert_eq!(query_terms("What is the refund policy?"), vec!["refund", "policy"]);
/// ```
#[must_use]
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in TERM_PATTERN
        .find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
    {
        if term.chars().count() >= 2 && !STOP_WORDS.contains(&term.as_str()) && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn term_set(text: &str) -> HashSet<String> {
    TERM_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn term_coverage(terms: &[String], present: &HashSet<String>) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms.iter().filter(|t| present.contains(*t)).count();
    matched as f32 / terms.len() as f32
}
