//! Pluggable persistence + dispatch for job queues.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::JobQueueError;
use super::types::{Job, JobId, JobState};

/// Boxed future returned by a process function.
pub type ProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<serde_json::Value>> + Send>>;

/// The async function a queue runs for each job.
///
/// `Ok` carries the job result; `Err` fails the attempt.
pub type ProcessFn = Arc<dyn Fn(Job) -> ProcessFuture + Send + Sync>;

/// Wrap a plain async closure as a [`ProcessFn`].
pub fn process_fn<F, Fut>(f: F) -> ProcessFn
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(move |job| Box::pin(f(job)))
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobListOptions {
    /// Empty = every queue.
    pub queue_names: Vec<String>,
    /// Empty = every state.
    pub states: Vec<JobState>,
    pub skip: usize,
    pub take: Option<usize>,
}

impl JobListOptions {
    pub fn matches(&self, job: &Job) -> bool {
        (self.queue_names.is_empty() || self.queue_names.contains(&job.queue_name))
            && (self.states.is_empty() || self.states.contains(&job.state))
    }
}

/// Persists jobs and runs the process function of started queues.
///
/// Responsible for concurrency control and retry scheduling; queues only
/// forward to it.
#[async_trait]
pub trait JobQueueStrategy: Send + Sync {
    /// Persist a job and make it available to workers. Returns it with an id.
    async fn add(&self, job: Job) -> Result<Job, JobQueueError>;

    /// Begin consuming `queue_name` with `process`.
    async fn start(&self, queue_name: &str, process: ProcessFn) -> Result<(), JobQueueError>;

    /// Stop consuming `queue_name`, waiting for in-flight jobs.
    ///
    /// Stopping a queue that is not running is a no-op.
    async fn stop(&self, queue_name: &str) -> Result<(), JobQueueError>;

    async fn find_one(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;

    /// Unknown ids are skipped.
    async fn find_many(&self, ids: &[JobId]) -> Result<Vec<Job>, JobQueueError>;

    /// Jobs ordered by creation time.
    async fn find_jobs(&self, options: &JobListOptions) -> Result<Vec<Job>, JobQueueError>;

    /// Cancel an unsettled job. Returns the job as stored afterwards.
    async fn cancel_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;

    /// Record progress (clamped to 100) of a running job.
    async fn update_progress(&self, id: JobId, progress: u8) -> Result<Option<Job>, JobQueueError>;

    /// Delete settled jobs of `queue_names` (all when empty) settled before `older_than`.
    async fn remove_settled_jobs(
        &self,
        queue_names: &[String],
        older_than: DateTime<Utc>,
    ) -> Result<u64, JobQueueError>;
}
