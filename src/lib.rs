//! # kbase
//!
//! Scoped knowledge base for AI agent conversations.
//!
//! Users attach reference text at three scopes (account-wide, thread and
//! agent) and kbase assembles a token-budgeted text block that is injected
//! into prompts.
//!
//! ## Features
//!
//! - Single `SQLite` table with a scope discriminator for all entries
//! - Token estimates maintained by database triggers
//! - Recency-ordered context assembly with stop-at-first-overflow truncation
//! - Best-effort text extraction from uploaded documents
//! - REST server (feature `http`) and a degrading REST client
//!
//! ## Example
//!
//! ```rust,ignore
//! use kbase::{KnowledgeBase, NewEntry, Scope};
//!
//! let kb = KnowledgeBase::in_memory()?;
//! kb.entries().create(NewEntry::new(
//!     Scope::global("acct-1"),
//!     "Style guide",
//!     "Always answer in British English.",
//! ))?;
//! let context = kb.context().combined_context("acct-1", "thread-1", None, 4000)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod http;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::KbConfig;
pub use models::{
    DocumentChunk, DocumentRemoval, EntryId, EntryListing, EntryUpdate, KnowledgeEntry, NewEntry,
    ProcessingJob, ProcessingStatus, QueryHit, QueryLogEntry, QueryRequest, QueryResult, Scope,
    ScopeKey, ScopeKind, ScopeStats, SourceType, UsageContext,
};
pub use services::{
    ContextBuilderService, DocumentProcessor, EntryService, Extraction, KnowledgeBase,
    QueryService, UploadOutcome, UploadRequest, UploadService, estimate_tokens,
};
pub use storage::{KnowledgeStore, ProcessingStore, QueryLogStore, SqliteKnowledgeStore};

/// Error type for kbase operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty content, unknown usage context, missing scope id, oversized upload |
/// | `NotFound` | Entry or processing job absent, or entry belongs to another scope |
/// | `Conflict` | Entry name still taken after all rename attempts |
/// | `OperationFailed` | `SQLite` errors, I/O errors, HTTP failures |
/// | `FeatureNotEnabled` | `serve` without the `http` feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of resource ("entry", "processing job").
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A uniqueness constraint could not be satisfied.
    ///
    /// Raised by the store on a duplicate entry name within a scope, and by
    /// the entry service once every timestamp-suffixed retry also collided.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn failed(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds an [`Error::NotFound`] for a knowledge entry.
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "entry",
            id: id.into(),
        }
    }
}

/// Result type alias for kbase operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// ```rust
/// let ts = kbase::current_timestamp_millis();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("content cannot be empty".to_string());
        assert_eq!(err.to_string(), "invalid input: content cannot be empty");

        let err = Error::failed("insert_entry", "disk full");
        assert_eq!(err.to_string(), "operation 'insert_entry' failed: disk full");

        let err = Error::entry_not_found("abc");
        assert_eq!(err.to_string(), "entry not found: abc");

        let err = Error::Conflict("name taken".to_string());
        assert_eq!(err.to_string(), "conflict: name taken");
    }

    #[test]
    fn test_current_timestamp_is_millis() {
        // Anything after 2001 in milliseconds is above 10^12.
        assert!(current_timestamp_millis() > 1_000_000_000_000);
    }
}
