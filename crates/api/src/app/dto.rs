use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docket_core::{DomainError, JobId};
use docket_infra::jobs::{JobFilter, JobStats, JobStatus, JobView};

/// Upper bound for `GET /jobs?limit=`.
pub const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub id: JobId,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    /// Substring of title, input text or summary
    pub search: Option<String>,
    /// RFC 3339, inclusive
    pub created_after: Option<DateTime<Utc>>,
    /// RFC 3339, exclusive
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, DomainError> {
        let mut filter = JobFilter::default();
        if let Some(status) = self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.with_status(status.trim().parse::<JobStatus>()?);
        }
        if let Some(search) = self.search {
            filter = filter.with_search(search);
        }
        if let Some(at) = self.created_after {
            filter = filter.created_after(at);
        }
        if let Some(at) = self.created_before {
            filter = filter.created_before(at);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit.min(MAX_LIST_LIMIT));
        }
        Ok(filter)
    }
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub count: usize,
    pub jobs: Vec<JobView>,
}

impl From<Vec<JobView>> for ListJobsResponse {
    fn from(jobs: Vec<JobView>) -> Self {
        Self {
            count: jobs.len(),
            jobs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatsResponse {
    #[serde(flatten)]
    pub by_status: JobStats,
    pub total: usize,
}

impl From<JobStats> for JobStatsResponse {
    fn from(stats: JobStats) -> Self {
        Self {
            total: stats.total(),
            by_status: stats,
        }
    }
}
