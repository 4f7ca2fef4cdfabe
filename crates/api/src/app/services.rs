//! Infrastructure wiring: store and queue selection, the job service and the
//! worker pool that drains the queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use docket_ai::TextGenerator;
use docket_infra::AppConfig;
use docket_infra::jobs::{
    DEFAULT_VISIBILITY_GRACE, Dispatcher, InMemoryJobStore, JobService, JobStore,
    PostgresJobStore, Worker, WorkerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolHandle,
};
use docket_queue::{DispatchQueue, InMemoryDispatchQueue};

pub type SharedStore = Arc<dyn JobStore>;
pub type SharedQueue = Arc<dyn DispatchQueue>;

const POSTGRES_MAX_CONNECTIONS: u32 = 10;

/// Shared by every handler through an `Extension`.
pub struct AppServices {
    store: SharedStore,
    queue: SharedQueue,
    jobs: JobService<SharedStore, SharedQueue>,
}

impl AppServices {
    pub fn new(store: SharedStore, queue: SharedQueue, dispatch_grace: Duration) -> Self {
        let dispatcher = Dispatcher::new(store.clone(), queue.clone())
            .with_visibility_grace(dispatch_grace);
        Self {
            store,
            queue,
            jobs: JobService::new(dispatcher),
        }
    }

    /// In-memory store and queue (dev/tests).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryDispatchQueue::new()),
            DEFAULT_VISIBILITY_GRACE,
        )
    }

    /// Postgres when `DATABASE_URL` is set, Redis when `REDIS_URL` is set and
    /// the `redis` feature is on; in-memory otherwise.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let store = PostgresJobStore::connect(url, POSTGRES_MAX_CONNECTIONS).await?;
                store.migrate().await?;
                info!("using postgres job store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; jobs are kept in memory");
                Arc::new(InMemoryJobStore::new())
            }
        };

        let queue = build_queue(config)?;
        Ok(Self::new(store, queue, config.dispatch_grace))
    }

    pub fn jobs(&self) -> &JobService<SharedStore, SharedQueue> {
        &self.jobs
    }

    /// Start workers on this process's store and queue.
    pub fn spawn_workers<G>(
        &self,
        generator: G,
        worker_config: WorkerConfig,
        pool_config: WorkerPoolConfig,
    ) -> WorkerPoolHandle
    where
        G: TextGenerator + 'static,
    {
        let worker = Worker::new(
            self.store.clone(),
            self.queue.clone(),
            generator,
            worker_config,
        );
        WorkerPool::spawn(worker, pool_config)
    }
}

#[cfg(feature = "redis")]
fn build_queue(config: &AppConfig) -> anyhow::Result<SharedQueue> {
    match &config.redis_url {
        Some(url) => {
            info!("using redis dispatch queue");
            Ok(Arc::new(docket_infra::queue::RedisDispatchQueue::new(url)?))
        }
        None => Ok(Arc::new(InMemoryDispatchQueue::new())),
    }
}

#[cfg(not(feature = "redis"))]
fn build_queue(config: &AppConfig) -> anyhow::Result<SharedQueue> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled; using the in-memory queue");
    }
    Ok(Arc::new(InMemoryDispatchQueue::new()))
}
