//! Knowledge entry types and identifiers.

use super::{Scope, SourceType, UsageContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of an entry name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Unique identifier for a knowledge entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Creates an entry ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered entry ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A stored knowledge entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique identifier.
    pub id: EntryId,
    /// Owning scope.
    pub scope: Scope,
    /// Display name, unique within the scope.
    pub name: String,
    /// Optional description rendered above the content.
    pub description: Option<String>,
    /// Reference text.
    pub content: String,
    /// Estimated token count of `content`, maintained by the store.
    pub content_tokens: Option<usize>,
    /// When the entry is injected into prompts.
    pub usage_context: UsageContext,
    /// Inactive entries are kept but never assembled or queried.
    pub is_active: bool,
    /// Where the content came from.
    pub source_type: SourceType,
    /// Free-form metadata about the source (file name, mime type, ...).
    pub source_metadata: Option<serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last time a query surfaced this entry.
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl KnowledgeEntry {
    /// Returns the description if it is present and not blank.
    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Request to create an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Owning scope.
    pub scope: Scope,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Reference text.
    pub content: String,
    /// Usage context (defaults to `always`).
    #[serde(default)]
    pub usage_context: UsageContext,
    /// Source type (defaults to `manual`).
    #[serde(default)]
    pub source_type: SourceType,
    /// Optional source metadata.
    #[serde(default)]
    pub source_metadata: Option<serde_json::Value>,
}

impl NewEntry {
    /// Creates a manual, always-used entry request.
    #[must_use]
    pub fn new(scope: Scope, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            description: None,
            content: content.into(),
            usage_context: UsageContext::default(),
            source_type: SourceType::default(),
            source_metadata: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the usage context.
    #[must_use]
    pub const fn with_usage_context(mut self, usage_context: UsageContext) -> Self {
        self.usage_context = usage_context;
        self
    }

    /// Sets the source type.
    #[must_use]
    pub const fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Sets the source metadata.
    #[must_use]
    pub fn with_source_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.source_metadata = Some(metadata);
        self
    }
}

/// Partial update of an entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New content.
    #[serde(default)]
    pub content: Option<String>,
    /// New usage context.
    #[serde(default)]
    pub usage_context: Option<UsageContext>,
    /// Activate or deactivate the entry.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl EntryUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.usage_context.is_none()
            && self.is_active.is_none()
    }
}

/// Entries of one scope with aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryListing {
    /// Entries, newest first.
    pub entries: Vec<KnowledgeEntry>,
    /// Number of entries.
    pub total_count: usize,
    /// Sum of the entries' token estimates.
    pub total_tokens: usize,
}

impl EntryListing {
    /// Builds a listing and computes its totals.
    #[must_use]
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        let total_tokens = entries.iter().filter_map(|e| e.content_tokens).sum();
        Self {
            total_count: entries.len(),
            total_tokens,
            entries,
        }
    }
}

/// Aggregate statistics for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStats {
    /// All entries, active or not.
    pub total_entries: usize,
    /// Active entries.
    pub active_entries: usize,
    /// Active entries that take part in automatic assembly.
    pub assembled_entries: usize,
    /// Token estimate of all active entries.
    pub active_tokens: usize,
}
