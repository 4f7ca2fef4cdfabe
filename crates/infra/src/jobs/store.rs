//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use docket_core::JobId;

use super::types::{Job, JobStatus, NewJob, ResultUpdate};

/// Default page size for [`JobFilter`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Job store abstraction.
///
/// The store is the single source of truth for job status. Workers never write
/// a status blindly: every transition goes through [`JobStore::compare_and_set_status`]
/// or [`JobStore::update_result`], which only accepts a `Processing` job.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `Queued` status and return the committed record.
    ///
    /// When this returns, the record is visible to subsequent `get` calls
    /// (subject to the backend's read-after-write guarantees).
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError>;

    /// Load a job by id.
    async fn get(&self, id: JobId) -> Result<Job, JobStoreError>;

    /// Atomically move `id` to `to` if its current status is one of `from`.
    ///
    /// Returns `Ok(true)` when exactly this caller performed the transition. At
    /// most one of many concurrent callers with overlapping `from` sets succeeds.
    /// Transitions the state machine does not allow are never applied.
    async fn compare_and_set_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, JobStoreError>;

    /// Write the pipeline result together with its terminal status.
    ///
    /// Only applied while the job is `Processing`; returns `Ok(false)` for an
    /// unclaimed (`Queued`) job and for one that is already `Done` or `Failed`.
    async fn update_result(&self, id: JobId, update: ResultUpdate) -> Result<bool, JobStoreError>;

    /// List jobs, newest first.
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError>;

    /// Count jobs per status.
    async fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[async_trait::async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        (**self).create(new_job).await
    }

    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        (**self).get(id).await
    }

    async fn compare_and_set_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, JobStoreError> {
        (**self).compare_and_set_status(id, from, to).await
    }

    async fn update_result(&self, id: JobId, update: ResultUpdate) -> Result<bool, JobStoreError> {
        (**self).update_result(id, update).await
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(filter).await
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats().await
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, JobStoreError::NotFound(_))
    }
}

/// Listing filter.
///
/// `search` is a case-insensitive substring match on title, input text and
/// summary. `created_after` is inclusive, `created_before` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub search: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            created_after: None,
            created_before: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Blank search terms are ignored.
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `job` passes every predicate (the limit is not applied here).
    pub fn matches(&self, job: &Job) -> bool {
        if self.status.is_some_and(|s| job.status != s) {
            return false;
        }
        if self.created_after.is_some_and(|at| job.created_at < at) {
            return false;
        }
        if self.created_before.is_some_and(|at| job.created_at >= at) {
            return false;
        }
        match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                [Some(job.title.as_str()), Some(job.input_text.as_str()), job.summary.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        }
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Queued => self.queued += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Done => self.done += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.done + self.failed
    }
}

/// In-memory job store for tests/dev.
///
/// Every write happens under one write lock, which makes the compare-and-set
/// atomic with respect to all other operations.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job map lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        let job = Job::create(new_job);
        self.write()?.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn compare_and_set_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !from.contains(&job.status) {
            return Ok(false);
        }
        Ok(job.transition(to))
    }

    async fn update_result(&self, id: JobId, update: ResultUpdate) -> Result<bool, JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        Ok(job.record_result(&update))
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();

        // v7 ids break created_at ties in creation order
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(filter.limit);
        Ok(result)
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.read()?;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }
}
