//! Postgres-backed job store.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so several worker processes can poll
//! the same table without double-processing a job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use super::error::{JobQueueError, map_sqlx_error};
use super::store::JobStore;
use super::strategy::JobListOptions;
use super::types::{Job, JobId, JobState};

const JOB_COLUMNS: &str = "id, queue_name, data, state, progress, result, error, retries, attempts, \
     created_at, started_at, settled_at, scheduled_at";

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// SQL used to claim the next ready job of a queue (bind `$1` = queue name).
    pub fn claim_sql() -> String {
        format!(
            r#"
            UPDATE job_queue_jobs
            SET state = 'RUNNING',
                attempts = attempts + 1,
                started_at = NOW(),
                scheduled_at = NULL
            WHERE id = (
                SELECT id FROM job_queue_jobs
                WHERE queue_name = $1
                  AND state IN ('PENDING', 'RETRYING')
                  AND (scheduled_at IS NULL OR scheduled_at <= NOW())
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        )
    }

    /// Builder for `list` (exposed for SQL inspection).
    pub fn list_query(options: &JobListOptions) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM job_queue_jobs WHERE TRUE"));
        if !options.queue_names.is_empty() {
            qb.push(" AND queue_name = ANY(")
                .push_bind(options.queue_names.clone())
                .push(")");
        }
        if !options.states.is_empty() {
            let states: Vec<String> = options.states.iter().map(|s| s.as_str().to_string()).collect();
            qb.push(" AND state = ANY(").push_bind(states).push(")");
        }
        qb.push(" ORDER BY created_at ASC, id ASC");
        if let Some(take) = options.take {
            qb.push(" LIMIT ").push_bind(take as i64);
        }
        qb.push(" OFFSET ").push_bind(options.skip as i64);
        qb
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, JobQueueError> {
    let decode = |e: sqlx::Error| JobQueueError::Serialization(format!("failed to decode job row: {e}"));

    let state: String = row.try_get("state").map_err(decode)?;
    let progress: i16 = row.try_get("progress").map_err(decode)?;
    let retries: i32 = row.try_get("retries").map_err(decode)?;
    let attempts: i32 = row.try_get("attempts").map_err(decode)?;

    Ok(Job {
        id: Some(JobId::from_uuid(row.try_get("id").map_err(decode)?)),
        queue_name: row.try_get("queue_name").map_err(decode)?,
        data: row.try_get("data").map_err(decode)?,
        state: state.parse::<JobState>()?,
        progress: progress.clamp(0, 100) as u8,
        result: row.try_get("result").map_err(decode)?,
        error: row.try_get("error").map_err(decode)?,
        retries: retries.max(0) as u32,
        attempts: attempts.max(0) as u32,
        created_at: row.try_get("created_at").map_err(decode)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        settled_at: row.try_get("settled_at").map_err(decode)?,
        scheduled_at: row.try_get("scheduled_at").map_err(decode)?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(queue = %job.queue_name), err)]
    async fn insert(&self, mut job: Job) -> Result<Job, JobQueueError> {
        let id = job.id.unwrap_or_default();
        job.id = Some(id);

        sqlx::query(
            r#"
            INSERT INTO job_queue_jobs (
                id, queue_name, data, state, progress, result, error,
                retries, attempts, created_at, started_at, settled_at, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&job.queue_name)
        .bind(&job.data)
        .bind(job.state.as_str())
        .bind(job.progress as i16)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.retries as i32)
        .bind(job.attempts as i32)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.settled_at)
        .bind(job.scheduled_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;

        Ok(job)
    }

    #[instrument(skip(self, job), fields(job_id = ?job.id, state = job.state.as_str()), err)]
    async fn update(&self, job: &Job) -> Result<(), JobQueueError> {
        let id = job.id.ok_or(JobQueueError::NotPersisted)?;

        let result = sqlx::query(
            r#"
            UPDATE job_queue_jobs
            SET state = $2,
                progress = $3,
                result = $4,
                error = $5,
                attempts = $6,
                started_at = $7,
                settled_at = $8,
                scheduled_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(job.state.as_str())
        .bind(job.progress as i16)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.attempts as i32)
        .bind(job.started_at)
        .bind(job.settled_at)
        .bind(job.scheduled_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(JobQueueError::JobNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue_jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_many(&self, ids: &[JobId]) -> Result<Vec<Job>, JobQueueError> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue_jobs WHERE id = ANY($1) ORDER BY created_at ASC"
        ))
        .bind(uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_many_jobs", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn list(&self, options: &JobListOptions) -> Result<Vec<Job>, JobQueueError> {
        let mut qb = Self::list_query(options);
        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self, queue_name: &str) -> Result<Option<Job>, JobQueueError> {
        let row = sqlx::query(&Self::claim_sql())
            .bind(queue_name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_next_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn remove_settled(
        &self,
        queue_names: &[String],
        older_than: DateTime<Utc>,
    ) -> Result<u64, JobQueueError> {
        let result = sqlx::query(
            r#"
            DELETE FROM job_queue_jobs
            WHERE state IN ('COMPLETED', 'FAILED', 'CANCELLED')
              AND settled_at < $1
              AND (cardinality($2::text[]) = 0 OR queue_name = ANY($2))
            "#,
        )
        .bind(older_than)
        .bind(queue_names.to_vec())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove_settled_jobs", e))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_skips_locked_rows_in_fifo_order() {
        let sql = PostgresJobStore::claim_sql();
        assert!(sql.contains("FOR UPDATE SKIP LOCKED"));
        assert!(sql.contains("ORDER BY created_at ASC, id ASC"));
        assert!(sql.contains("state IN ('PENDING', 'RETRYING')"));
    }

    #[test]
    fn list_query_only_filters_what_was_asked() {
        let all = PostgresJobStore::list_query(&JobListOptions::default());
        assert!(!all.sql().contains("queue_name = ANY"));

        let filtered = PostgresJobStore::list_query(&JobListOptions {
            queue_names: vec!["update-search-index".into()],
            states: vec![JobState::Failed],
            skip: 10,
            take: Some(5),
        });
        let sql = filtered.sql();
        assert!(sql.contains("queue_name = ANY($1)"));
        assert!(sql.contains("state = ANY($2)"));
        assert!(sql.contains("LIMIT $3"));
        assert!(sql.contains("OFFSET $4"));
    }
}
