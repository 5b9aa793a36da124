//! Job storage used by the polling strategy.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::JobQueueError;
use super::strategy::JobListOptions;
use super::types::{Job, JobId};

/// Job store abstraction.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job, assigning its id.
    async fn insert(&self, job: Job) -> Result<Job, JobQueueError>;

    /// Overwrite a persisted job.
    async fn update(&self, job: &Job) -> Result<(), JobQueueError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;

    async fn get_many(&self, ids: &[JobId]) -> Result<Vec<Job>, JobQueueError>;

    async fn list(&self, options: &JobListOptions) -> Result<Vec<Job>, JobQueueError>;

    /// Atomically claim the oldest ready job of `queue_name` and mark it running.
    ///
    /// Returns `None` if no jobs are available. Two concurrent callers never
    /// receive the same job.
    async fn claim_next(&self, queue_name: &str) -> Result<Option<Job>, JobQueueError>;

    async fn remove_settled(
        &self,
        queue_names: &[String],
        older_than: DateTime<Utc>,
    ) -> Result<u64, JobQueueError>;
}

/// In-memory job store for tests/dev.
///
/// Jobs are kept in insertion order so claims are FIFO.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Job>>, JobQueueError> {
        self.jobs
            .lock()
            .map_err(|_| JobQueueError::Storage("job store lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, mut job: Job) -> Result<Job, JobQueueError> {
        let id = job.id.unwrap_or_default();
        let mut jobs = self.lock()?;
        if jobs.iter().any(|j| j.id == Some(id)) {
            return Err(JobQueueError::Storage(format!("job already exists: {id}")));
        }
        job.id = Some(id);
        jobs.push(job.clone());
        Ok(job)
    }

    async fn update(&self, job: &Job) -> Result<(), JobQueueError> {
        let id = job.id.ok_or(JobQueueError::NotPersisted)?;
        let mut jobs = self.lock()?;
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == Some(id))
            .ok_or(JobQueueError::JobNotFound(id))?;
        *slot = job.clone();
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let jobs = self.lock()?;
        Ok(jobs.iter().find(|j| j.id == Some(id)).cloned())
    }

    async fn get_many(&self, ids: &[JobId]) -> Result<Vec<Job>, JobQueueError> {
        let jobs = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| jobs.iter().find(|j| j.id == Some(*id)).cloned())
            .collect())
    }

    async fn list(&self, options: &JobListOptions) -> Result<Vec<Job>, JobQueueError> {
        let jobs = self.lock()?;
        Ok(jobs
            .iter()
            .filter(|j| options.matches(j))
            .skip(options.skip)
            .take(options.take.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn claim_next(&self, queue_name: &str) -> Result<Option<Job>, JobQueueError> {
        let now = Utc::now();
        let mut jobs = self.lock()?;
        match jobs
            .iter_mut()
            .find(|j| j.queue_name == queue_name && j.is_ready(now))
        {
            Some(job) => {
                job.start();
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn remove_settled(
        &self,
        queue_names: &[String],
        older_than: DateTime<Utc>,
    ) -> Result<u64, JobQueueError> {
        let mut jobs = self.lock()?;
        let before = jobs.len();
        jobs.retain(|j| {
            let in_scope = queue_names.is_empty() || queue_names.contains(&j.queue_name);
            let expired = j.is_settled() && j.settled_at.is_some_and(|at| at < older_than);
            !(in_scope && expired)
        });
        Ok((before - jobs.len()) as u64)
    }
}
