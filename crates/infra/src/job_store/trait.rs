use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use textq_core::{AnalysisResult, JobId, JobStatus, JobView};

/// Job store error.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job already exists: {0}")]
    AlreadyExists(JobId),

    /// Connectivity or backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Full persisted state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub payload_text: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Durable record of job identity, status, payload, error and result.
///
/// The single source of truth for job state. Each call is atomic on its own;
/// there is no transaction spanning several calls.
///
/// ## Invariants
///
/// - `status == done` implies a result exists for the job
/// - `status == error` implies `error` is set
/// - `payload_text` never changes after `create`
/// - `started_at` / `finished_at` are written at most once
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in status `queued`.
    async fn create(&self, job_id: JobId, text: &str) -> Result<(), StoreError>;

    /// Load the submitted text. `Ok(None)` when the job does not exist.
    async fn fetch_text(&self, job_id: JobId) -> Result<Option<String>, StoreError>;

    /// Move `queued`→`running` (or refresh `running`), setting `started_at` if unset.
    ///
    /// Jobs already `done` or `error` are left untouched. Returns whether the
    /// update applied.
    async fn mark_running(&self, job_id: JobId) -> Result<bool, StoreError>;

    /// Unconditionally move to `error`, storing `message` truncated to
    /// [`textq_core::MAX_ERROR_CHARS`] characters.
    async fn mark_error(&self, job_id: JobId, message: &str) -> Result<(), StoreError>;

    /// Upsert the result, then move to `done` and clear `error`.
    ///
    /// Safe to repeat: a second call leaves one result and the same status.
    async fn save_result_and_done(
        &self,
        job_id: JobId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError>;

    /// Status view of a job; `result` is only set when the job is `done`.
    async fn query(&self, job_id: JobId) -> Result<Option<JobView>, StoreError>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn create(&self, job_id: JobId, text: &str) -> Result<(), StoreError> {
        (**self).create(job_id, text).await
    }

    async fn fetch_text(&self, job_id: JobId) -> Result<Option<String>, StoreError> {
        (**self).fetch_text(job_id).await
    }

    async fn mark_running(&self, job_id: JobId) -> Result<bool, StoreError> {
        (**self).mark_running(job_id).await
    }

    async fn mark_error(&self, job_id: JobId, message: &str) -> Result<(), StoreError> {
        (**self).mark_error(job_id, message).await
    }

    async fn save_result_and_done(
        &self,
        job_id: JobId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        (**self).save_result_and_done(job_id, result).await
    }

    async fn query(&self, job_id: JobId) -> Result<Option<JobView>, StoreError> {
        (**self).query(job_id).await
    }
}
