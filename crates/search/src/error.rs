use thiserror::Error;

use firelancer_core::DomainError;
use firelancer_infra::collections::CollectionError;
use firelancer_infra::job_posts::RepositoryError;
use firelancer_infra::job_queue::JobQueueError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Malformed search input. Raised before any query runs.
    #[error("user input error: {0}")]
    UserInput(String),

    #[error("search storage error: {0}")]
    Storage(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    pub fn user_input(msg: impl Into<String>) -> Self {
        SearchError::UserInput(msg.into())
    }
}

impl From<SearchError> for DomainError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::UserInput(msg) => DomainError::UserInput(msg),
            SearchError::Storage(msg) => DomainError::InvariantViolation(msg),
        }
    }
}

impl From<RepositoryError> for SearchError {
    fn from(err: RepositoryError) -> Self {
        SearchError::Storage(err.to_string())
    }
}

impl From<CollectionError> for SearchError {
    fn from(err: CollectionError) -> Self {
        SearchError::Storage(err.to_string())
    }
}

impl From<JobQueueError> for SearchError {
    fn from(err: JobQueueError) -> Self {
        SearchError::Storage(err.to_string())
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SearchError {
    match err {
        sqlx::Error::Database(db_err) => {
            SearchError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        _ => SearchError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
