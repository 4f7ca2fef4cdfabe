//! Postgres-backed job store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | JobStoreError |
//! |------------|---------------|
//! | Database (any code) | `Storage` with the operation name and database message |
//! | PoolClosed | `Storage` |
//! | Row decode failures | `Storage` |
//!
//! A missing row is reported as `NotFound` by the store itself, never inferred
//! from `sqlx::Error::RowNotFound`.
//!
//! ## Compare-and-set
//!
//! `compare_and_set_status` is a single `UPDATE ... WHERE id = $1 AND status = ANY($2)`.
//! Postgres row locking makes concurrent updates of the same row serialize, and
//! the second one re-evaluates the `WHERE` clause against the committed status,
//! so at most one caller sees `rows_affected() == 1`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use docket_core::JobId;

use super::store::{JobFilter, JobStats, JobStore, JobStoreError};
use super::types::{Job, JobStatus, NewJob, ResultUpdate};

const MIGRATIONS: &str = include_str!("../../migrations/0001_create_jobs.sql");

const JOB_COLUMNS: &str =
    "id, title, input_text, summary, checklist, status, created_at, updated_at";

/// Postgres-backed job store.
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, JobStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `jobs` table and its indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, id: JobId) -> Result<bool, JobStoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM jobs WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists", e))
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, new_job), fields(job_id = tracing::field::Empty), err)]
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        let job = Job::create(new_job);
        tracing::Span::current().record("job_id", tracing::field::display(job.id));

        sqlx::query(
            r#"
            INSERT INTO jobs (id, title, input_text, summary, checklist, status, created_at, updated_at)
            VALUES ($1, $2, $3, NULL, NULL, $4, $5, $6)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.title)
        .bind(&job.input_text)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get(&self, id: JobId) -> Result<Job, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(JobStoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(job_id = %id, to = %to), err)]
    async fn compare_and_set_status(
        &self,
        id: JobId,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, JobStoreError> {
        let allowed: Vec<&str> = from
            .iter()
            .filter(|s| s.can_transition_to(to))
            .map(JobStatus::as_str)
            .collect();

        let updated = if allowed.is_empty() {
            0
        } else {
            sqlx::query(
                "UPDATE jobs SET status = $3, updated_at = now() WHERE id = $1 AND status = ANY($2)",
            )
            .bind(id.as_uuid())
            .bind(&allowed)
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("compare_and_set_status", e))?
            .rows_affected()
        };

        if updated == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(JobStoreError::NotFound(id))
        }
    }

    #[instrument(skip(self, update), fields(job_id = %id, status = %update.status()), err)]
    async fn update_result(&self, id: JobId, update: ResultUpdate) -> Result<bool, JobStoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
               SET summary = $2, checklist = $3, status = $4, updated_at = now()
             WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.summary())
        .bind(update.checklist().map(Json))
        .bind(update.status().as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_result", e))?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(JobStoreError::NotFound(id))
        }
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let pattern = filter.search.as_deref().map(|term| format!("%{}%", escape_like(term)));
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM jobs
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR title ILIKE $2 OR input_text ILIKE $2 OR summary ILIKE $2)
               AND ($3::timestamptz IS NULL OR created_at >= $3)
               AND ($4::timestamptz IS NULL OR created_at < $4)
             ORDER BY created_at DESC, id DESC
             LIMIT $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(pattern)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("stats", e))?;
            let count: i64 = row.try_get("count").map_err(|e| map_sqlx_error("stats", e))?;
            let status = status
                .parse::<JobStatus>()
                .map_err(|e| JobStoreError::Storage(format!("unknown status in jobs table: {e}")))?;
            stats.record(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }
}

// SQLx row types

#[derive(Debug)]
struct JobRow {
    id: Uuid,
    title: String,
    input_text: String,
    summary: Option<String>,
    checklist: Option<Json<Vec<String>>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            input_text: row.try_get("input_text")?,
            summary: row.try_get("summary")?,
            checklist: row.try_get("checklist")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| JobStoreError::Storage(format!("job {}: {e}", row.id)))?;
        Ok(Job {
            id: JobId::from_uuid(row.id),
            title: row.title,
            input_text: row.input_text,
            summary: row.summary,
            checklist: row.checklist.map(|Json(items)| items),
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    use sqlx::FromRow;

    JobRow::from_row(row)
        .map_err(|e| JobStoreError::Storage(format!("failed to decode job row: {e}")))?
        .try_into()
}

/// Escape `LIKE` wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            JobStoreError::Storage(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
