//! Document processing jobs.
//!
//! A job tracks one uploaded file from `pending` through `processing` to
//! `completed` or `failed`. Once extraction has populated an entry the job is
//! only kept for status polling.

use super::{EntryId, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Recorded, not yet picked up.
    #[default]
    Pending,
    /// Text extraction in progress.
    Processing,
    /// Entry created from extracted text.
    Completed,
    /// Extraction or entry creation failed.
    Failed,
}

impl ProcessingStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document processing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Job identifier.
    pub id: String,
    /// Scope the resulting entry is created in.
    pub scope: Scope,
    /// Original file name.
    pub filename: String,
    /// Logical storage path of the upload.
    pub file_path: String,
    /// Size of the upload in bytes.
    pub file_size: u64,
    /// Declared or guessed MIME type.
    pub mime_type: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    /// Current status.
    pub status: ProcessingStatus,
    /// Failure detail for `failed` jobs.
    pub error_message: Option<String>,
    /// Entry created from this upload, if any.
    pub entry_id: Option<EntryId>,
    /// When the upload was recorded.
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome of removing an uploaded document from a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRemoval {
    /// File name that was matched.
    pub filename: String,
    /// Entries created from uploads of that file.
    pub entries_deleted: usize,
    /// Processing jobs of those uploads.
    pub jobs_deleted: usize,
}

impl DocumentRemoval {
    /// Returns true if nothing matched.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries_deleted == 0 && self.jobs_deleted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_terminal() {
        assert_eq!(ProcessingStatus::parse("FAILED"), Some(ProcessingStatus::Failed));
        assert_eq!(ProcessingStatus::parse("queued"), None);
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }
}
