//! Postgres buffer storage (`job_buffer_items`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use super::storage::JobBufferStorageStrategy;
use crate::job_queue::error::{JobQueueError, map_sqlx_error};
use crate::job_queue::types::Job;

/// Claim-and-remove in one statement so concurrent flushes split the rows.
pub const FLUSH_SQL: &str = r#"
    WITH claimed AS (
        DELETE FROM job_buffer_items
        WHERE buffer_id = ANY($1)
        RETURNING id, buffer_id, job
    )
    SELECT buffer_id, job FROM claimed ORDER BY id ASC
"#;

#[derive(Debug, Clone)]
pub struct PostgresJobBufferStorage {
    pool: Arc<PgPool>,
}

impl PostgresJobBufferStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BufferRow {
    buffer_id: String,
    job: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct SizeRow {
    buffer_id: String,
    count: i64,
}

#[async_trait]
impl JobBufferStorageStrategy for PostgresJobBufferStorage {
    #[instrument(skip(self, job), fields(queue = %job.queue_name), err)]
    async fn add(&self, buffer_id: &str, job: Job) -> Result<(), JobQueueError> {
        let payload = serde_json::to_value(&job)?;
        sqlx::query("INSERT INTO job_buffer_items (buffer_id, job) VALUES ($1, $2)")
            .bind(buffer_id)
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("buffer_add", e))?;
        Ok(())
    }

    async fn buffer_size(&self, buffer_ids: &[String]) -> Result<HashMap<String, usize>, JobQueueError> {
        let rows: Vec<SizeRow> = sqlx::query_as(
            r#"
            SELECT buffer_id, COUNT(*) AS count
            FROM job_buffer_items
            WHERE buffer_id = ANY($1)
            GROUP BY buffer_id
            "#,
        )
        .bind(buffer_ids.to_vec())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("buffer_size", e))?;

        Ok(rows
            .into_iter()
            .map(|r| (r.buffer_id, r.count.max(0) as usize))
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn flush(&self, buffer_ids: &[String]) -> Result<HashMap<String, Vec<Job>>, JobQueueError> {
        let rows: Vec<BufferRow> = sqlx::query_as(FLUSH_SQL)
            .bind(buffer_ids.to_vec())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("buffer_flush", e))?;

        let mut flushed: HashMap<String, Vec<Job>> = HashMap::new();
        for row in rows {
            let job: Job = serde_json::from_value(row.job)?;
            flushed.entry(row.buffer_id).or_default().push(job);
        }
        Ok(flushed)
    }
}
