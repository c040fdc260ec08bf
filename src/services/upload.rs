//! Document upload pipeline.
//!
//! An upload is recorded as a `pending` [`ProcessingJob`], then processed:
//! text is extracted, an entry is created from it and the job is finished.
//! A file that yields no text still produces an entry (with placeholder
//! content) so the upload is visible, and the job ends `failed`.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::instrument;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::models::{
    KnowledgeEntry, MAX_NAME_LENGTH, NewEntry, ProcessingJob, ProcessingStatus, Scope, ScopeKey,
    SourceType, UsageContext,
};
use crate::services::entries::{validate_scope, validate_scope_key};
use crate::services::{DocumentProcessor, EntryService, Extraction};
use crate::storage::ProcessingStore;
use crate::{Error, Result};

/// An uploaded file waiting to be turned into an entry.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Scope the entry is created in.
    pub scope: Scope,
    /// Original file name.
    pub filename: String,
    /// Declared MIME type, if the client sent one.
    pub mime_type: Option<String>,
    /// Description for the created entry.
    pub description: Option<String>,
    /// Usage context for the created entry.
    pub usage_context: UsageContext,
}

impl UploadRequest {
    /// Creates a request with no declared type or description.
    #[must_use]
    pub fn new(scope: Scope, filename: impl Into<String>) -> Self {
        Self {
            scope,
            filename: filename.into(),
            mime_type: None,
            description: None,
            usage_context: UsageContext::default(),
        }
    }

    /// Sets the declared MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the entry description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the entry usage context.
    #[must_use]
    pub const fn with_usage_context(mut self, usage_context: UsageContext) -> Self {
        self.usage_context = usage_context;
        self
    }
}

/// Outcome of processing one upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The job in its terminal state.
    pub job: ProcessingJob,
    /// The entry created from the upload.
    pub entry: KnowledgeEntry,
}

/// Service turning uploaded documents into knowledge entries.
pub struct UploadService {
    jobs: Arc<dyn ProcessingStore>,
    entries: Arc<EntryService>,
    processor: DocumentProcessor,
    max_upload_bytes: u64,
}

impl UploadService {
    /// Creates an upload service.
    #[must_use]
    pub fn new(
        jobs: Arc<dyn ProcessingStore>,
        entries: Arc<EntryService>,
        processor: DocumentProcessor,
    ) -> Self {
        Self {
            jobs,
            entries,
            processor,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Sets the upload size limit.
    #[must_use]
    pub const fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Records a `pending` job for an upload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the scope or filename is blank or
    /// the file exceeds the size limit.
    #[instrument(skip(self, request, bytes), fields(filename = %request.filename, size = bytes.len()))]
    pub fn enqueue(&self, request: &UploadRequest, bytes: &[u8]) -> Result<ProcessingJob> {
        validate_scope(&request.scope)?;
        let filename = sanitize_filename(&request.filename)?;

        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(Error::InvalidInput(format!(
                "file is {size} bytes, the limit is {} bytes",
                self.max_upload_bytes
            )));
        }

        let id = Uuid::new_v4().to_string();
        let job = ProcessingJob {
            file_path: format!("uploads/{id}/{filename}"),
            mime_type: DocumentProcessor::resolve_mime(request.mime_type.as_deref(), &filename),
            id,
            scope: request.scope.clone(),
            filename,
            file_size: size,
            sha256: hex::encode(Sha256::digest(bytes)),
            status: ProcessingStatus::Pending,
            error_message: None,
            entry_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.jobs.create_job(&job)?;
        metrics::counter!("uploads_enqueued_total").increment(1);
        tracing::info!(job_id = %job.id, mime_type = %job.mime_type, "Upload recorded");
        Ok(job)
    }

    /// Processes a recorded job: extracts text and creates the entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the job status cannot be updated or the entry
    /// cannot be created. In the latter case the job is marked `failed`.
    #[instrument(skip(self, request, bytes), fields(job_id = %job.id))]
    pub fn process(
        &self,
        job: &ProcessingJob,
        request: &UploadRequest,
        bytes: &[u8],
    ) -> Result<UploadOutcome> {
        self.jobs
            .set_job_status(&job.id, ProcessingStatus::Processing, None, None)?;

        let extraction = self.processor.process(bytes, &job.mime_type, &job.filename);
        let content = if extraction.text.is_empty() {
            placeholder_content(&job.filename)
        } else {
            extraction.text.clone()
        };

        let mut entry = NewEntry::new(job.scope.clone(), upload_entry_name(&job.filename), content)
            .with_usage_context(request.usage_context)
            .with_source_type(SourceType::FileUpload)
            .with_source_metadata(source_metadata(job, &extraction));
        entry.description.clone_from(&request.description);

        let entry = match self.entries.create(entry) {
            Ok(entry) => entry,
            Err(e) => {
                let message = e.to_string();
                self.jobs
                    .set_job_status(&job.id, ProcessingStatus::Failed, Some(&message), None)?;
                metrics::counter!("uploads_processed_total", "status" => "failed").increment(1);
                return Err(e);
            },
        };

        let status = if extraction.succeeded() {
            ProcessingStatus::Completed
        } else {
            ProcessingStatus::Failed
        };
        self.jobs
            .set_job_status(&job.id, status, extraction.error.as_deref(), Some(&entry.id))?;
        metrics::counter!("uploads_processed_total", "status" => status.as_str()).increment(1);
        tracing::info!(entry_id = %entry.id, status = %status, "Upload processed");

        let job = self.job_status(&job.id)?;
        Ok(UploadOutcome { job, entry })
    }

    /// Records and processes an upload in one call.
    ///
    /// # Errors
    ///
    /// See [`Self::enqueue`] and [`Self::process`].
    pub fn upload(&self, request: &UploadRequest, bytes: &[u8]) -> Result<UploadOutcome> {
        let job = self.enqueue(request, bytes)?;
        self.process(&job, request, bytes)
    }

    /// Looks up a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the job does not exist.
    pub fn job_status(&self, job_id: &str) -> Result<ProcessingJob> {
        self.jobs
            .get_job(job_id)?
            .ok_or_else(|| Error::NotFound {
                resource: "processing job",
                id: job_id.to_string(),
            })
    }

    /// Lists the jobs of a scope, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank scope id, and an error if
    /// the store fails.
    pub fn jobs(&self, scope: &ScopeKey) -> Result<Vec<ProcessingJob>> {
        validate_scope_key(scope)?;
        self.jobs.list_jobs(scope)
    }
}

/// Content stored for an upload that yielded no text.
#[must_use]
pub fn placeholder_content(filename: &str) -> String {
    format!("[No text could be extracted from {filename}]")
}

/// Entry name for an uploaded file.
///
/// Names longer than [`MAX_NAME_LENGTH`] characters are shortened, keeping
/// the extension. The job and the entry metadata keep the full file name.
#[must_use]
pub fn upload_entry_name(filename: &str) -> String {
    if filename.chars().count() <= MAX_NAME_LENGTH {
        return filename.to_string();
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .filter(|e| e.chars().count() < MAX_NAME_LENGTH / 2)
        .unwrap_or_default();
    let room = MAX_NAME_LENGTH - extension.chars().count();
    let stem: String = filename.chars().take(room).collect();
    format!("{}{extension}", stem.trim_end())
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(Error::InvalidInput("filename is required".to_string()));
    }
    Ok(name.to_string())
}

fn source_metadata(job: &ProcessingJob, extraction: &Extraction) -> serde_json::Value {
    let mut metadata = json!({
        "job_id": job.id,
        "filename": extraction.metadata.filename,
        "mime_type": extraction.metadata.mime_type,
        "file_size_bytes": extraction.metadata.file_size_bytes,
        "extension": extraction.metadata.extension,
        "has_content": extraction.metadata.has_content,
        "file_path": job.file_path,
        "sha256": job.sha256,
        "total_chunks": extraction.chunks.len(),
        "total_tokens": extraction.total_tokens,
    });
    if let (Some(error), Some(map)) = (&extraction.error, metadata.as_object_mut()) {
        map.insert("extraction_error".to_string(), json!(error));
    }
    metadata
}
