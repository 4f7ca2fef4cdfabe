//! Core job types and the status state machine.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docket_core::{DomainError, DomainResult, JobId};

/// Title used when a submission does not carry one.
pub const PLACEHOLDER_TITLE: &str = "Untitled Document";

/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

/// Job execution status.
///
/// ```text
/// Queued ──► Processing ──► Done
///    │            │
///    └────────────┴──────► Failed
/// ```
///
/// `Done` and `Failed` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Stored, waiting for a worker to claim it
    Queued,
    /// Claimed by exactly one worker; stages are running
    Processing,
    /// Summary and checklist are available
    Done,
    /// A stage failed, or the job never became visible to workers
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// `Queued -> Failed` is allowed for jobs whose dispatch gave up before a
    /// worker could claim them.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!(
                "status must be one of: queued, processing, done, failed (got {other:?})"
            ))),
        }
    }
}

/// Validated fields for a job about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    title: String,
    input_text: String,
}

impl NewJob {
    /// Validate submission fields.
    ///
    /// - `input_text` must contain something other than whitespace
    /// - a missing or blank `title` becomes [`PLACEHOLDER_TITLE`]
    /// - `title` is limited to [`MAX_TITLE_CHARS`] characters
    pub fn new(title: Option<String>, input_text: impl Into<String>) -> DomainResult<Self> {
        let input_text = input_text.into();
        if input_text.trim().is_empty() {
            return Err(DomainError::validation("input_text: this field may not be blank"));
        }

        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => PLACEHOLDER_TITLE.to_string(),
        };
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(format!(
                "title: ensure this field has no more than {MAX_TITLE_CHARS} characters"
            )));
        }

        Ok(Self { title, input_text })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }
}

/// A submitted document and its derived results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub input_text: String,
    /// Set once the summarize stage succeeded
    pub summary: Option<String>,
    /// Set only when the job is `Done`
    pub checklist: Option<Vec<String>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Materialize a new queued job with a fresh id.
    pub fn create(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            title: new_job.title,
            input_text: new_job.input_text,
            summary: None,
            checklist: None,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether it moved.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Record the pipeline result together with its terminal status.
    ///
    /// Only a claimed (`Processing`) job accepts a result; anything else is
    /// left untouched (returns `false`).
    pub fn record_result(&mut self, update: &ResultUpdate) -> bool {
        if self.status != JobStatus::Processing || !self.status.can_transition_to(update.status) {
            return false;
        }
        self.summary = update.summary.clone();
        self.checklist = update.checklist.clone();
        self.status = update.status;
        self.updated_at = Utc::now();
        true
    }
}

/// Final write of a pipeline execution.
///
/// Construction enforces the record invariants: the status is terminal and a
/// checklist is present exactly when the status is `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultUpdate {
    summary: Option<String>,
    checklist: Option<Vec<String>>,
    status: JobStatus,
}

impl ResultUpdate {
    pub fn done(summary: String, checklist: Vec<String>) -> DomainResult<Self> {
        if checklist.is_empty() {
            return Err(DomainError::validation("a done job needs at least one checklist item"));
        }
        Ok(Self {
            summary: Some(summary),
            checklist: Some(checklist),
            status: JobStatus::Done,
        })
    }

    /// Failure result, keeping whatever summary was produced before the failure.
    pub fn failed(summary: Option<String>) -> Self {
        Self {
            summary,
            checklist: None,
            status: JobStatus::Failed,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn checklist(&self) -> Option<&[String]> {
        self.checklist.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> Job {
        Job::create(NewJob::new(Some("Pre-op".to_string()), "Fast for 12 hours.").unwrap())
    }

    #[test]
    fn new_jobs_start_queued_without_results() {
        let job = queued_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.summary.is_none());
        assert!(job.checklist.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn blank_input_is_rejected() {
        for input in ["", "   ", "\n\t"] {
            assert!(matches!(NewJob::new(None, input), Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn missing_or_blank_title_uses_placeholder() {
        assert_eq!(NewJob::new(None, "X").unwrap().title(), PLACEHOLDER_TITLE);
        assert_eq!(
            NewJob::new(Some("  ".to_string()), "X").unwrap().title(),
            PLACEHOLDER_TITLE
        );
        assert_eq!(NewJob::new(Some("Mine".to_string()), "X").unwrap().title(), "Mine");
    }

    #[test]
    fn title_length_is_capped() {
        assert!(NewJob::new(Some("a".repeat(255)), "X").is_ok());
        assert!(NewJob::new(Some("a".repeat(256)), "X").is_err());
        // counted in characters, not bytes
        assert!(NewJob::new(Some("é".repeat(255)), "X").is_ok());
    }

    #[test]
    fn transitions_only_move_forward() {
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                let allowed = from.can_transition_to(to);
                if from.is_terminal() || to == JobStatus::Queued || from == to {
                    assert!(!allowed, "{from} -> {to} must be rejected");
                }
            }
        }
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn transition_from_terminal_is_a_noop() {
        let mut job = queued_job();
        assert!(job.transition(JobStatus::Processing));
        assert!(job.transition(JobStatus::Failed));
        let before = job.clone();

        assert!(!job.transition(JobStatus::Processing));
        assert!(!job.record_result(&ResultUpdate::failed(None)));
        assert_eq!(job, before);
    }

    #[test]
    fn unclaimed_job_rejects_a_result() {
        let mut job = queued_job();
        let before = job.clone();
        let done = ResultUpdate::done("s".to_string(), vec!["a".to_string()]).unwrap();

        assert!(!job.record_result(&done));
        assert!(!job.record_result(&ResultUpdate::failed(None)));
        assert_eq!(job, before);

        assert!(job.transition(JobStatus::Processing));
        assert!(job.record_result(&done));
        assert_eq!(job.status, JobStatus::Done);
    }

    #[test]
    fn done_requires_a_non_empty_checklist() {
        assert!(ResultUpdate::done("s".to_string(), vec![]).is_err());
        let update = ResultUpdate::done("s".to_string(), vec!["a".to_string()]).unwrap();
        assert_eq!(update.status(), JobStatus::Done);
        assert_eq!(update.checklist().map(<[String]>::len), Some(1));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("DONE".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("cancelled".parse::<JobStatus>().is_err());
        assert_eq!(serde_json::to_value(JobStatus::Processing).unwrap(), "processing");
    }
}
