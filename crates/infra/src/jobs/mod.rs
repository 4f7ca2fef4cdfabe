//! Job lifecycle: storage, dispatch, workers and the caller-facing service.
//!
//! ## Design
//!
//! - A job is created in `Queued` and only then enqueued (commit-then-enqueue)
//! - Workers reload the record on every delivery; the message carries only the id
//! - `JobStore::compare_and_set_status` is the single concurrency primitive:
//!   exactly one execution moves a job from `Queued` to `Processing`
//! - A delivery that races ahead of the commit is re-enqueued with exponential
//!   backoff (`RetryPolicy`)
//! - Stage failures mark the job `Failed` and are never retried
//!
//! ## Components
//!
//! - `JobStore`: persistence with CAS (in-memory or Postgres)
//! - `Dispatcher`: create, then enqueue
//! - `Worker`: handles one dispatch message
//! - `WorkerPool`: N tokio tasks sharing a queue
//! - `JobService`: submit/query boundary

pub mod dispatcher;
pub mod pool;
pub mod postgres;
pub mod retry;
pub mod service;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{DEFAULT_VISIBILITY_GRACE, DispatchError, Dispatcher};
pub use pool::{PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolHandle};
pub use postgres::PostgresJobStore;
pub use retry::RetryPolicy;
pub use service::{JobService, JobView, ServiceError, SubmitJob};
pub use store::{InMemoryJobStore, JobFilter, JobStats, JobStore, JobStoreError};
pub use types::{Job, JobStatus, MAX_TITLE_CHARS, NewJob, PLACEHOLDER_TITLE, ResultUpdate};
pub use worker::{ExecutionOutcome, Worker, WorkerConfig, WorkerError};
