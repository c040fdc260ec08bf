//! Document processing job storage trait.

use crate::Result;
use crate::models::{EntryId, ProcessingJob, ProcessingStatus, ScopeKey};

/// Trait for processing job storage.
pub trait ProcessingStore: Send + Sync {
    /// Records a new job.
    fn create_job(&self, job: &ProcessingJob) -> Result<()>;

    /// Retrieves a job by ID.
    fn get_job(&self, id: &str) -> Result<Option<ProcessingJob>>;

    /// Moves a job to a new status.
    ///
    /// Terminal statuses also stamp `completed_at`. Returns false if the job
    /// does not exist.
    fn set_job_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        error_message: Option<&str>,
        entry_id: Option<&EntryId>,
    ) -> Result<bool>;

    /// Lists the jobs of a scope, newest first.
    fn list_jobs(&self, scope: &ScopeKey) -> Result<Vec<ProcessingJob>>;
}
