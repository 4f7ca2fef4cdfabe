//! Pool of worker tasks consuming the dispatch queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use docket_ai::TextGenerator;
use docket_queue::{DispatchQueue, QueueError};

use super::store::JobStore;
use super::worker::{ExecutionOutcome, Worker, WorkerError};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent worker tasks
    pub concurrency: usize,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            name: "job-worker-pool".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub messages_handled: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub skipped: u64,
    pub rescheduled: u64,
    pub abandoned: u64,
    pub errors: u64,
    pub in_flight: usize,
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct PoolCounters {
    started: Instant,
    messages_handled: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    skipped: AtomicU64,
    rescheduled: AtomicU64,
    abandoned: AtomicU64,
    errors: AtomicU64,
    in_flight: AtomicUsize,
}

impl PoolCounters {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            messages_handled: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            rescheduled: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn record(&self, result: &Result<ExecutionOutcome, WorkerError>) {
        self.messages_handled.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(ExecutionOutcome::Completed { .. }) => &self.jobs_completed,
            Ok(ExecutionOutcome::Skipped { .. }) => &self.skipped,
            Ok(ExecutionOutcome::Rescheduled { .. }) => &self.rescheduled,
            Ok(ExecutionOutcome::Abandoned { .. }) => &self.abandoned,
            Err(WorkerError::ExternalService { .. }) => &self.jobs_failed,
            Err(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Handle to control a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
    counters: Arc<PoolCounters>,
}

impl WorkerPoolHandle {
    /// Stop dequeuing and wait for in-flight executions to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "worker task panicked");
            }
        }
    }

    /// Get current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

/// Spawns `concurrency` tokio tasks sharing one [`Worker`].
///
/// Each task loops on `dequeue`; the queue hands every message to exactly one
/// task. Shutdown is only observed between messages, so a running pipeline is
/// never cut short.
pub struct WorkerPool;

impl WorkerPool {
    pub fn spawn<S, Q, G>(worker: Worker<S, Q, G>, config: WorkerPoolConfig) -> WorkerPoolHandle
    where
        S: JobStore + 'static,
        Q: DispatchQueue + 'static,
        G: TextGenerator + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(PoolCounters::new());
        let worker = Arc::new(worker);
        let mut tasks = JoinSet::new();

        for index in 0..config.concurrency.max(1) {
            let task_name = format!("{}-{index}", config.name);
            tasks.spawn(worker_loop(
                task_name,
                worker.clone(),
                shutdown_rx.clone(),
                counters.clone(),
            ));
        }

        info!(pool = %config.name, concurrency = config.concurrency, "worker pool started");

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            tasks,
            counters,
        }
    }
}

async fn worker_loop<S, Q, G>(
    name: String,
    worker: Arc<Worker<S, Q, G>>,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<PoolCounters>,
) where
    S: JobStore,
    Q: DispatchQueue,
    G: TextGenerator,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = worker.queue().dequeue() => message,
        };

        let message = match message {
            Ok(message) => message,
            Err(QueueError::Closed) => break,
            Err(err) => {
                warn!(worker = %name, error = %err, "dequeue failed");
                counters.errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        let result = worker.handle(message).await;
        counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        counters.record(&result);

        if let Err(err) = result {
            match err {
                // the job is already marked failed; stages are never retried
                WorkerError::ExternalService { .. } => {
                    warn!(worker = %name, job_id = %message.job_id(), error = %err, "job failed")
                }
                _ => error!(worker = %name, job_id = %message.job_id(), error = %err, "dispatch message dropped"),
            }
        }
    }

    info!(worker = %name, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docket_ai::AiError;
    use docket_queue::{DispatchMessage, InMemoryDispatchQueue};

    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::testing::ScriptedGenerator;
    use crate::jobs::types::{JobStatus, NewJob};
    use crate::jobs::worker::WorkerConfig;

    async fn wait_for<F>(mut done: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn pool_processes_every_job_once() {
        let store = InMemoryJobStore::arc();
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let generator = Arc::new(ScriptedGenerator::repeating(5));
        let worker = Worker::new(store.clone(), queue.clone(), generator.clone(), WorkerConfig::default());
        let pool = WorkerPool::spawn(worker, WorkerPoolConfig::default().with_concurrency(3));

        let mut ids = Vec::new();
        for i in 0..5 {
            let job = store.create(NewJob::new(None, format!("doc {i}")).unwrap()).await.unwrap();
            queue.enqueue(DispatchMessage::new(job.id)).await.unwrap();
            // duplicate delivery must not run the pipeline again
            queue.enqueue(DispatchMessage::new(job.id)).await.unwrap();
            ids.push(job.id);
        }

        wait_for(|| pool.stats().messages_handled == 10).await;

        let stats = pool.stats();
        assert_eq!(stats.jobs_completed, 5);
        assert_eq!(stats.skipped, 5);
        assert_eq!(generator.calls(), 10);
        for id in ids {
            assert_eq!(store.get(id).await.unwrap().status, JobStatus::Done);
        }

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn stage_failures_are_counted_and_the_pool_keeps_running() {
        let store = InMemoryJobStore::arc();
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(AiError::request("down")),
            Ok("sum"),
            Ok("- a"),
        ]));
        let worker = Worker::new(store.clone(), queue.clone(), generator, WorkerConfig::default());
        let pool = WorkerPool::spawn(worker, WorkerPoolConfig::default().with_concurrency(1));

        let failed = store.create(NewJob::new(None, "one").unwrap()).await.unwrap();
        queue.enqueue(DispatchMessage::new(failed.id)).await.unwrap();
        let ok = store.create(NewJob::new(None, "two").unwrap()).await.unwrap();
        queue.enqueue(DispatchMessage::new(ok.id)).await.unwrap();

        wait_for(|| pool.stats().messages_handled == 2).await;

        assert_eq!(pool.stats().jobs_failed, 1);
        assert_eq!(store.get(failed.id).await.unwrap().status, JobStatus::Failed);
        assert_eq!(store.get(ok.id).await.unwrap().status, JobStatus::Done);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let worker = Worker::new(
            InMemoryJobStore::arc(),
            queue,
            Arc::new(ScriptedGenerator::new(vec![])),
            WorkerConfig::default(),
        );
        let pool = WorkerPool::spawn(worker, WorkerPoolConfig::default().with_concurrency(2));

        tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closed_queue_ends_the_pool() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let worker = Worker::new(
            InMemoryJobStore::arc(),
            queue.clone(),
            Arc::new(ScriptedGenerator::new(vec![])),
            WorkerConfig::default(),
        );
        let mut pool = WorkerPool::spawn(worker, WorkerPoolConfig::default().with_concurrency(2));
        queue.close().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while pool.tasks.join_next().await.is_some() {}
        })
        .await
        .unwrap();
    }
}
