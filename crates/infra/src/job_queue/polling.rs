//! Polling job queue strategy.
//!
//! One tokio task per started queue polls a [`JobStore`] for ready jobs and
//! runs them on a bounded pool. Failed attempts are rescheduled with the
//! configured [`RetryPolicy`] until the job's `retries` are used up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::JobQueueError;
use super::postgres::PostgresJobStore;
use super::store::{InMemoryJobStore, JobStore};
use super::strategy::{JobListOptions, JobQueueStrategy, ProcessFn};
use super::types::{Job, JobId, JobState, RetryPolicy};

/// Polling strategy configuration.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// How often an idle queue polls for new jobs
    pub poll_interval: Duration,
    /// Maximum concurrent jobs per queue
    pub concurrency: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            concurrency: 1,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl PollingConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

struct QueueWorker {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Job queue strategy that polls a [`JobStore`].
pub struct PollingJobQueueStrategy<S: JobStore> {
    store: Arc<S>,
    config: PollingConfig,
    workers: Mutex<HashMap<String, QueueWorker>>,
}

/// Polling over process-local storage.
pub type InMemoryJobQueueStrategy = PollingJobQueueStrategy<InMemoryJobStore>;

/// Polling over the `job_queue_jobs` table.
pub type PostgresJobQueueStrategy = PollingJobQueueStrategy<PostgresJobStore>;

impl InMemoryJobQueueStrategy {
    pub fn in_memory(config: PollingConfig) -> Self {
        Self::new(InMemoryJobStore::new(), config)
    }
}

impl<S: JobStore + 'static> PollingJobQueueStrategy<S> {
    pub fn new(store: S, config: PollingConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn is_running(&self, queue_name: &str) -> bool {
        self.workers
            .lock()
            .map(|w| w.contains_key(queue_name))
            .unwrap_or(false)
    }

    fn workers(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, QueueWorker>>, JobQueueError> {
        self.workers
            .lock()
            .map_err(|_| JobQueueError::Storage("worker registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl<S: JobStore + 'static> JobQueueStrategy for PollingJobQueueStrategy<S> {
    async fn add(&self, job: Job) -> Result<Job, JobQueueError> {
        let job = self.store.insert(job).await?;
        debug!(queue = %job.queue_name, job_id = ?job.id, "job added");
        Ok(job)
    }

    async fn start(&self, queue_name: &str, process: ProcessFn) -> Result<(), JobQueueError> {
        let mut workers = self.workers()?;
        if workers.contains_key(queue_name) {
            return Err(JobQueueError::AlreadyStarted(queue_name.to_string()));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(poll_loop(
            self.store.clone(),
            queue_name.to_string(),
            process,
            self.config.clone(),
            shutdown_rx,
        ));

        workers.insert(
            queue_name.to_string(),
            QueueWorker {
                shutdown: shutdown_tx,
                join,
            },
        );
        Ok(())
    }

    async fn stop(&self, queue_name: &str) -> Result<(), JobQueueError> {
        let worker = self.workers()?.remove(queue_name);
        let Some(worker) = worker else {
            return Ok(());
        };

        let _ = worker.shutdown.send(true);
        if let Err(err) = worker.join.await {
            warn!(queue = queue_name, error = %err, "queue worker did not shut down cleanly");
        }
        Ok(())
    }

    async fn find_one(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        self.store.get(id).await
    }

    async fn find_many(&self, ids: &[JobId]) -> Result<Vec<Job>, JobQueueError> {
        self.store.get_many(ids).await
    }

    async fn find_jobs(&self, options: &JobListOptions) -> Result<Vec<Job>, JobQueueError> {
        self.store.list(options).await
    }

    async fn cancel_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(None);
        };
        if job.cancel() {
            self.store.update(&job).await?;
            info!(queue = %job.queue_name, job_id = %id, "job cancelled");
        }
        Ok(Some(job))
    }

    async fn update_progress(&self, id: JobId, progress: u8) -> Result<Option<Job>, JobQueueError> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(None);
        };
        if job.state == JobState::Running {
            job.set_progress(progress);
            self.store.update(&job).await?;
        }
        Ok(Some(job))
    }

    async fn remove_settled_jobs(
        &self,
        queue_names: &[String],
        older_than: DateTime<Utc>,
    ) -> Result<u64, JobQueueError> {
        self.store.remove_settled(queue_names, older_than).await
    }
}

async fn poll_loop<S: JobStore + 'static>(
    store: Arc<S>,
    queue: String,
    process: ProcessFn,
    config: PollingConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let concurrency = config.concurrency.max(1);
    let permits = Arc::new(Semaphore::new(concurrency));
    info!(queue = %queue, concurrency, "queue worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match store.claim_next(&queue).await {
            Ok(Some(job)) => {
                let store = store.clone();
                let process = process.clone();
                let policy = config.retry_policy.clone();
                tokio::spawn(async move {
                    run_job(&*store, process, &policy, job).await;
                    drop(permit);
                });
                // More work may be waiting; claim again without sleeping.
                continue;
            }
            Ok(None) => drop(permit),
            Err(err) => {
                drop(permit);
                warn!(queue = %queue, error = %err, "failed to claim next job");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    // Wait for in-flight jobs.
    let _ = permits.acquire_many(concurrency as u32).await;
    info!(queue = %queue, "queue worker stopped");
}

async fn run_job<S: JobStore + ?Sized>(store: &S, process: ProcessFn, policy: &RetryPolicy, mut job: Job) {
    let Some(job_id) = job.id else {
        return;
    };
    let queue = job.queue_name.clone();
    let attempt = job.attempts;
    debug!(queue = %queue, job_id = %job_id, attempt, "claimed job");

    // Run in its own task so a panicking process function only fails this job.
    let outcome = match tokio::spawn(process(job.clone())).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(join_err) if join_err.is_panic() => Err(panic_message(join_err.into_panic())),
        Err(join_err) => Err(format!("job task aborted: {join_err}")),
    };

    match store.get(job_id).await {
        Ok(Some(current)) if current.state == JobState::Cancelled => {
            info!(queue = %queue, job_id = %job_id, "job cancelled while running, outcome discarded");
            return;
        }
        Ok(Some(current)) => job.progress = current.progress,
        Ok(None) => {
            warn!(queue = %queue, job_id = %job_id, "job removed while running");
            return;
        }
        Err(err) => warn!(queue = %queue, job_id = %job_id, error = %err, "failed to re-read job"),
    }

    match outcome {
        Ok(result) => {
            job.complete(result);
            info!(queue = %queue, job_id = %job_id, attempt, "job completed");
        }
        Err(message) => {
            job.fail(message.clone());
            if job.state == JobState::Retrying {
                let delay = policy.delay_for_attempt(attempt);
                job.schedule_retry(delay);
                warn!(
                    queue = %queue,
                    job_id = %job_id,
                    attempt,
                    retries = job.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "job failed, will retry"
                );
            } else {
                error!(queue = %queue, job_id = %job_id, attempt, error = %message, "job failed");
            }
        }
    }

    if let Err(err) = store.update(&job).await {
        error!(queue = %queue, job_id = %job_id, error = %err, "failed to record job outcome");
    }
}

pub(super) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}
