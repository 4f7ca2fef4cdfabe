use serde::{Deserialize, Serialize};

use docket_core::JobId;

/// Unit of work handed to a worker: a job reference plus the delivery attempt.
///
/// Notes:
/// - The message never carries job content; workers always reload the record.
/// - `attempt` starts at 1 and only grows when a worker re-schedules the message
///   because the job was not visible yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    job_id: JobId,
    attempt: u32,
}

impl DispatchMessage {
    pub const FIRST_ATTEMPT: u32 = 1;

    /// First delivery of a freshly committed job.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            attempt: Self::FIRST_ATTEMPT,
        }
    }

    pub fn with_attempt(job_id: JobId, attempt: u32) -> Self {
        Self {
            job_id,
            attempt: attempt.max(Self::FIRST_ATTEMPT),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The same job reference with the attempt counter bumped.
    pub fn next_attempt(&self) -> Self {
        Self {
            job_id: self.job_id,
            attempt: self.attempt.saturating_add(1),
        }
    }
}
