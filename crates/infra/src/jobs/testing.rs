//! Test doubles shared by the job module tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use docket_ai::{AiError, ChatMessage, TextGenerator};
use docket_core::JobId;
use docket_queue::{DispatchMessage, DispatchQueue, QueueError};

use super::store::{InMemoryJobStore, JobFilter, JobStats, JobStore, JobStoreError};
use super::types::{Job, JobStatus, NewJob, ResultUpdate};

/// Store whose `get` reports `NotFound` for a job a given number of times,
/// mimicking a read replica that has not seen the commit yet.
pub(crate) struct HidingJobStore {
    inner: InMemoryJobStore,
    hidden: Mutex<HashMap<JobId, usize>>,
}

impl HidingJobStore {
    pub(crate) fn new(inner: InMemoryJobStore) -> Self {
        Self {
            inner,
            hidden: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn hide_for(&self, id: JobId, reads: usize) {
        self.hidden.lock().unwrap().insert(id, reads);
    }
}

#[async_trait::async_trait]
impl JobStore for HidingJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        self.inner.create(new_job).await
    }

    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        {
            let mut hidden = self.hidden.lock().unwrap();
            if let Some(left) = hidden.get_mut(&id).filter(|left| **left > 0) {
                *left -= 1;
                return Err(JobStoreError::NotFound(id));
            }
        }
        self.inner.get(id).await
    }

    async fn compare_and_set_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, JobStoreError> {
        self.inner.compare_and_set_status(id, from, to).await
    }

    async fn update_result(&self, id: JobId, update: ResultUpdate) -> Result<bool, JobStoreError> {
        self.inner.update_result(id, update).await
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        self.inner.list(filter).await
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        self.inner.stats().await
    }
}

/// Queue that records delayed messages instead of scheduling them.
#[derive(Default)]
pub(crate) struct RecordingQueue {
    ready: Mutex<VecDeque<DispatchMessage>>,
    delayed: Mutex<VecDeque<(DispatchMessage, Duration)>>,
    delays: Mutex<Vec<Duration>>,
}

impl RecordingQueue {
    pub(crate) fn pop_delayed(&self) -> Option<(DispatchMessage, Duration)> {
        self.delayed.lock().unwrap().pop_front()
    }

    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DispatchQueue for RecordingQueue {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), QueueError> {
        self.ready.lock().unwrap().push_back(message);
        Ok(())
    }

    async fn enqueue_after(&self, message: DispatchMessage, delay: Duration) -> Result<(), QueueError> {
        self.delays.lock().unwrap().push(delay);
        self.delayed.lock().unwrap().push_back((message, delay));
        Ok(())
    }

    async fn dequeue(&self) -> Result<DispatchMessage, QueueError> {
        self.ready.lock().unwrap().pop_front().ok_or(QueueError::Closed)
    }
}

/// Text generator replaying a fixed list of replies, in order.
///
/// Once the script runs out every call fails, so unexpected calls show up as
/// failed jobs rather than hangs.
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(replies: Vec<Result<&str, AiError>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Generator that answers every call with the same summary/checklist pair.
    pub(crate) fn repeating(pairs: usize) -> Self {
        let mut replies = Vec::with_capacity(pairs * 2);
        for _ in 0..pairs {
            replies.push(Ok("A summary."));
            replies.push(Ok("- first\n- second"));
        }
        Self::new(replies)
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::request("no scripted reply left")))
    }
}
