use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use textq_core::{AnalysisResult, JobId, JobStatus, JobView, truncate_error};

use super::r#trait::{JobRecord, JobStore, StoreError};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, JobRecord>,
    results: HashMap<JobId, AnalysisResult>,
}

/// In-memory job store for tests/dev.
///
/// All mutations of one call happen under a single write lock, which gives the
/// same per-call atomicity as a database transaction.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: RwLock<State>,
    mutations: AtomicU64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a job row.
    pub fn record(&self, job_id: JobId) -> Option<JobRecord> {
        self.read().ok()?.jobs.get(&job_id).cloned()
    }

    /// Number of stored result rows (across all jobs).
    pub fn result_count(&self) -> usize {
        self.read().map(|s| s.results.len()).unwrap_or(0)
    }

    /// Number of successful write operations applied so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("job store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("job store lock poisoned".to_string()))
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job_id: JobId, text: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job_id) {
            return Err(StoreError::AlreadyExists(job_id));
        }
        state.jobs.insert(
            job_id,
            JobRecord {
                id: job_id,
                status: JobStatus::Queued,
                payload_text: text.to_string(),
                error: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        );
        self.bump();
        Ok(())
    }

    async fn fetch_text(&self, job_id: JobId) -> Result<Option<String>, StoreError> {
        let state = self.read()?;
        Ok(state.jobs.get(&job_id).map(|j| j.payload_text.clone()))
    }

    async fn mark_running(&self, job_id: JobId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if !job.status.can_start() {
            return Ok(false);
        }
        job.status = JobStatus::Running;
        job.started_at.get_or_insert_with(Utc::now);
        self.bump();
        Ok(true)
    }

    async fn mark_error(&self, job_id: JobId, message: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        job.status = JobStatus::Error;
        job.error = Some(truncate_error(message));
        job.finished_at.get_or_insert_with(Utc::now);
        self.bump();
        Ok(())
    }

    async fn save_result_and_done(
        &self,
        job_id: JobId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound(job_id));
        }

        // Result first, then status.
        state.results.insert(job_id, result.clone());
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Done;
            job.error = None;
            job.finished_at.get_or_insert_with(Utc::now);
        }
        self.bump();
        Ok(())
    }

    async fn query(&self, job_id: JobId) -> Result<Option<JobView>, StoreError> {
        let state = self.read()?;
        let Some(job) = state.jobs.get(&job_id) else {
            return Ok(None);
        };
        let result = match job.status {
            JobStatus::Done => state.results.get(&job_id).cloned(),
            _ => None,
        };
        Ok(Some(JobView {
            job_id,
            status: job.status,
            error: job.error.clone(),
            result,
        }))
    }
}
