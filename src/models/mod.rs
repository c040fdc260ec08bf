//! Data models for kbase.
//!
//! This module contains the core data structures used throughout the system.

mod domain;
mod entry;
mod processing;
mod scope;
mod search;

pub use domain::{ScopeKind, SourceType, UsageContext};
pub use entry::{
    EntryId, EntryListing, EntryUpdate, KnowledgeEntry, MAX_NAME_LENGTH, NewEntry, ScopeStats,
};
pub use processing::{DocumentRemoval, ProcessingJob, ProcessingStatus};
pub use scope::{Scope, ScopeKey};
pub use search::{
    DEFAULT_MAX_CHUNKS, DocumentChunk, QueryHit, QueryLogEntry, QueryRequest, QueryResult,
};
