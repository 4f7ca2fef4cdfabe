//! Submit and query operations exposed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docket_core::{DomainError, JobId};
use docket_queue::DispatchQueue;

use super::dispatcher::{DispatchError, Dispatcher};
use super::store::{JobFilter, JobStats, JobStore, JobStoreError};
use super::types::{Job, JobStatus, NewJob};

/// Submission payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitJob {
    pub title: Option<String>,
    pub input_text: Option<String>,
}

/// Read view of a job.
///
/// `summary` and `checklist` are only exposed once the job is `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub summary: Option<String>,
    pub checklist: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let done = job.status == JobStatus::Done;
        Self {
            id: job.id,
            title: job.title,
            status: job.status,
            summary: job.summary.filter(|_| done),
            checklist: job.checklist.filter(|_| done),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Store(JobStoreError),

    #[error(transparent)]
    Dispatch(DispatchError),
}

impl From<JobStoreError> for ServiceError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Store(store) => store.into(),
            other => ServiceError::Dispatch(other),
        }
    }
}

/// Caller-facing job operations.
pub struct JobService<S, Q> {
    dispatcher: Dispatcher<S, Q>,
}

impl<S, Q> JobService<S, Q>
where
    S: JobStore,
    Q: DispatchQueue,
{
    pub fn new(dispatcher: Dispatcher<S, Q>) -> Self {
        Self { dispatcher }
    }

    /// Validate, persist and dispatch a new job.
    ///
    /// Validation failures create nothing.
    pub async fn submit(&self, request: SubmitJob) -> Result<JobId, ServiceError> {
        let input_text = request
            .input_text
            .ok_or_else(|| DomainError::validation("input_text: this field is required"))?;
        let new_job = NewJob::new(request.title, input_text)?;
        let job = self.dispatcher.submit(new_job).await?;
        Ok(job.id)
    }

    /// Read a job.
    pub async fn query(&self, id: JobId) -> Result<JobView, ServiceError> {
        let job = self.dispatcher.store().get(id).await?;
        Ok(job.into())
    }

    pub async fn list(&self, filter: JobFilter) -> Result<Vec<JobView>, ServiceError> {
        let jobs = self.dispatcher.store().list(filter).await?;
        Ok(jobs.into_iter().map(JobView::from).collect())
    }

    pub async fn stats(&self) -> Result<JobStats, ServiceError> {
        Ok(self.dispatcher.store().stats().await?)
    }
}
