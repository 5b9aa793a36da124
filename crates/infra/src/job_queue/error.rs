use std::time::Duration;

use thiserror::Error;

use super::types::JobId;

/// Job queue error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobQueueError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The job was diverted into a buffer and has no id to track.
    #[error("job has not been persisted (it is buffered until the next flush)")]
    NotPersisted,

    #[error("timed out after {waited:?} waiting for job {job_id}")]
    Timeout { job_id: JobId, waited: Duration },

    #[error("job {job_id} failed: {error}")]
    JobFailed { job_id: JobId, error: String },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("queue already started: {0}")]
    AlreadyStarted(String),

    #[error("job buffer already registered: {0}")]
    BufferAlreadyRegistered(String),
}

impl From<serde_json::Error> for JobQueueError {
    fn from(err: serde_json::Error) -> Self {
        JobQueueError::Serialization(err.to_string())
    }
}

/// Map sqlx errors into queue errors, tagging the failing operation.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobQueueError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobQueueError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolTimedOut => {
            JobQueueError::Storage(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            JobQueueError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            JobQueueError::Serialization(format!("failed to decode row in {}: {}", operation, err))
        }
        _ => JobQueueError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
