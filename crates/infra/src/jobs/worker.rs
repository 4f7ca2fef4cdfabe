//! Dispatch-message handling: visibility retries, the idempotency gate and the
//! stage pipeline.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use docket_ai::{AiError, Pipeline, StageKind, TextGenerator, parse_checklist};
use docket_core::JobId;
use docket_queue::{DispatchMessage, DispatchQueue, QueueError};

use super::retry::RetryPolicy;
use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobStatus, ResultUpdate};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// Backoff used while a job is not visible yet
    pub retry_policy: RetryPolicy,
    /// Stages run for every claimed job
    pub pipeline: Pipeline,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "job-worker".to_string(),
            retry_policy: RetryPolicy::default(),
            pipeline: Pipeline::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// What happened to a dispatch message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The pipeline ran and the job is `Done`.
    Completed { job_id: JobId, checklist_items: usize },
    /// Another execution owns (or finished) the job; nothing was done.
    Skipped { job_id: JobId, status: JobStatus },
    /// The job was not visible yet; the message was re-enqueued.
    Rescheduled {
        job_id: JobId,
        next_attempt: u32,
        delay: Duration,
    },
    /// Retries ran out but the job showed up on the final check; it was
    /// marked `Failed` unless already terminal.
    Abandoned { job_id: JobId, marked_failed: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Retries are exhausted and the job still does not exist.
    #[error("job {job_id} not found after {attempts} attempts")]
    Fatal { job_id: JobId, attempts: u32 },

    /// A stage failed; the job has been marked `Failed`.
    #[error("job {job_id} failed in {stage} stage: {source}")]
    ExternalService {
        job_id: JobId,
        stage: StageKind,
        #[source]
        source: AiError,
    },

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Handles one dispatch message at a time.
///
/// Workers share nothing but the store and the queue; the store's
/// compare-and-set is the only coordination between them.
pub struct Worker<S, Q, G> {
    store: S,
    queue: Q,
    generator: G,
    config: WorkerConfig,
}

impl<S, Q, G> Worker<S, Q, G>
where
    S: JobStore,
    Q: DispatchQueue,
    G: TextGenerator,
{
    pub fn new(store: S, queue: Q, generator: G, config: WorkerConfig) -> Self {
        Self {
            store,
            queue,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Process one delivery.
    pub async fn handle(&self, message: DispatchMessage) -> Result<ExecutionOutcome, WorkerError> {
        match self.store.get(message.job_id()).await {
            Ok(job) => self.execute(job).await,
            Err(JobStoreError::NotFound(_)) => self.handle_missing(message).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_missing(&self, message: DispatchMessage) -> Result<ExecutionOutcome, WorkerError> {
        let job_id = message.job_id();
        let attempt = message.attempt();
        let policy = &self.config.retry_policy;

        if policy.should_retry(attempt) {
            let delay = policy.delay_for_attempt(attempt);
            let next = message.next_attempt();
            self.queue.enqueue_after(next, delay).await?;
            info!(
                worker = %self.config.name,
                job_id = %job_id,
                attempt,
                delay_secs = delay.as_secs_f64(),
                "job not visible yet, rescheduled"
            );
            return Ok(ExecutionOutcome::Rescheduled {
                job_id,
                next_attempt: next.attempt(),
                delay,
            });
        }

        match self.store.get(job_id).await {
            Err(JobStoreError::NotFound(_)) => {
                error!(worker = %self.config.name, job_id = %job_id, attempt, "job never became visible");
                Err(WorkerError::Fatal {
                    job_id,
                    attempts: attempt,
                })
            }
            Err(e) => Err(e.into()),
            Ok(_) => {
                let marked_failed = self
                    .store
                    .compare_and_set_status(
                        job_id,
                        &[JobStatus::Queued, JobStatus::Processing],
                        JobStatus::Failed,
                    )
                    .await?;
                warn!(
                    worker = %self.config.name,
                    job_id = %job_id,
                    attempt,
                    marked_failed,
                    "retries exhausted, job abandoned"
                );
                Ok(ExecutionOutcome::Abandoned {
                    job_id,
                    marked_failed,
                })
            }
        }
    }

    async fn execute(&self, job: Job) -> Result<ExecutionOutcome, WorkerError> {
        let job_id = job.id;

        // Idempotency gate: only the caller that moves Queued -> Processing runs stages.
        let claimed = self
            .store
            .compare_and_set_status(job_id, &[JobStatus::Queued], JobStatus::Processing)
            .await?;
        if !claimed {
            let status = self.store.get(job_id).await?.status;
            debug!(worker = %self.config.name, job_id = %job_id, %status, "job already claimed, skipping");
            return Ok(ExecutionOutcome::Skipped { job_id, status });
        }

        info!(worker = %self.config.name, job_id = %job_id, "job claimed");

        let pipeline = &self.config.pipeline;
        let mut summary: Option<String> = None;
        let mut input = job.input_text;

        for stage in pipeline.summarize_stages() {
            match stage.run(&self.generator, &input).await {
                Ok(output) => {
                    debug!(job_id = %job_id, stage = %stage.kind, "stage finished");
                    summary = Some(output.clone());
                    input = output;
                }
                Err(source) => return self.fail(job_id, summary, stage.kind, source).await,
            }
        }

        let checklist_stage = pipeline.checklist_stage();
        let raw = match checklist_stage.run(&self.generator, &input).await {
            Ok(raw) => raw,
            Err(source) => return self.fail(job_id, summary, checklist_stage.kind, source).await,
        };

        let checklist = parse_checklist(&raw);
        let checklist_items = checklist.len();
        let update = match ResultUpdate::done(summary.clone().unwrap_or_default(), checklist) {
            Ok(update) => update,
            // no items means nothing usable came back
            Err(_) => {
                return self
                    .fail(job_id, summary, checklist_stage.kind, AiError::EmptyResponse)
                    .await;
            }
        };

        if !self.store.update_result(job_id, update).await? {
            let status = self.store.get(job_id).await?.status;
            warn!(job_id = %job_id, %status, "job left processing before its result was written");
            return Ok(ExecutionOutcome::Skipped { job_id, status });
        }

        info!(worker = %self.config.name, job_id = %job_id, checklist_items, "job done");
        Ok(ExecutionOutcome::Completed {
            job_id,
            checklist_items,
        })
    }

    async fn fail(
        &self,
        job_id: JobId,
        summary: Option<String>,
        stage: StageKind,
        source: AiError,
    ) -> Result<ExecutionOutcome, WorkerError> {
        let marked = self
            .store
            .update_result(job_id, ResultUpdate::failed(summary))
            .await?;
        if marked {
            error!(worker = %self.config.name, job_id = %job_id, %stage, error = %source, "stage failed, job marked failed");
        } else {
            let status = self.store.get(job_id).await?.status;
            warn!(job_id = %job_id, %status, %stage, error = %source, "job left processing before its result was written");
        }
        Err(WorkerError::ExternalService {
            job_id,
            stage,
            source,
        })
    }
}
