//! Commit-then-enqueue dispatch.

use std::time::Duration;

use tracing::{debug, warn};

use docket_core::JobId;
use docket_queue::{DispatchMessage, DispatchQueue, QueueError};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, NewJob};

/// Default delay between commit and first delivery.
pub const DEFAULT_VISIBILITY_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to persist job: {0}")]
    Store(#[from] JobStoreError),

    /// The job is committed but no worker will see it until it is re-dispatched.
    #[error("job {job_id} was stored but could not be enqueued: {source}")]
    Enqueue {
        job_id: JobId,
        #[source]
        source: QueueError,
    },
}

/// Creates jobs and hands their ids to the dispatch queue.
///
/// This ensures the ordering invariant: **enqueue happens only after the create
/// write returned successfully**. A worker may still observe the message before
/// the record is readable on its connection; the worker's retry path covers that.
pub struct Dispatcher<S, Q> {
    store: S,
    queue: Q,
    visibility_grace: Duration,
}

impl<S, Q> Dispatcher<S, Q> {
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            store,
            queue,
            visibility_grace: DEFAULT_VISIBILITY_GRACE,
        }
    }

    /// Delay applied to the first delivery (zero enqueues immediately).
    pub fn with_visibility_grace(mut self, grace: Duration) -> Self {
        self.visibility_grace = grace;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }
}

impl<S, Q> Dispatcher<S, Q>
where
    S: JobStore,
    Q: DispatchQueue,
{
    /// Persist a new job, then enqueue its first dispatch message.
    pub async fn submit(&self, new_job: NewJob) -> Result<Job, DispatchError> {
        // 1) Commit (durable step)
        let job = self.store.create(new_job).await?;

        // 2) Enqueue the committed id
        self.dispatch(&job).await?;

        Ok(job)
    }

    /// Enqueue exactly one first-attempt message for an already committed job.
    pub async fn dispatch(&self, job: &Job) -> Result<(), DispatchError> {
        let message = DispatchMessage::new(job.id);
        self.queue
            .enqueue_after(message, self.visibility_grace)
            .await
            .map_err(|source| {
                warn!(job_id = %job.id, error = %source, "enqueue after commit failed");
                DispatchError::Enqueue {
                    job_id: job.id,
                    source,
                }
            })?;

        debug!(job_id = %job.id, grace_ms = self.visibility_grace.as_millis() as u64, "job dispatched");
        Ok(())
    }
}
