//! Named, typed job queues and subscribable job handles.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::buffer::JobBufferService;
use super::error::JobQueueError;
use super::strategy::{JobQueueStrategy, ProcessFn};
use super::types::{Job, JobId, JobOptions, JobState};

/// A queue of jobs carrying `D` payloads.
///
/// The queue never retries on its own; failed attempts are rescheduled by
/// the strategy according to each job's `retries`.
pub struct JobQueue<D> {
    name: String,
    process: ProcessFn,
    strategy: Arc<dyn JobQueueStrategy>,
    buffers: Arc<JobBufferService>,
    running: AtomicBool,
    _data: PhantomData<fn() -> D>,
}

impl<D> std::fmt::Debug for JobQueue<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl<D: Serialize> JobQueue<D> {
    pub(crate) fn new(
        name: String,
        process: ProcessFn,
        strategy: Arc<dyn JobQueueStrategy>,
        buffers: Arc<JobBufferService>,
    ) -> Self {
        Self {
            name,
            process,
            strategy,
            buffers,
            running: AtomicBool::new(false),
            _data: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Submit a job.
    ///
    /// If an active buffer collects it, the job is stored in the buffer and
    /// the returned handle has no id until a flush submits it.
    pub async fn add(&self, data: D, options: JobOptions) -> Result<SubscribableJob, JobQueueError> {
        let job = Job::new(self.name.clone(), serde_json::to_value(&data)?).with_options(options);

        if self.buffers.add(&job).await? {
            return Ok(SubscribableJob::new(job, self.strategy.clone()));
        }

        let job = self.strategy.add(job).await?;
        debug!(queue = %self.name, job_id = ?job.id, "job submitted");
        Ok(SubscribableJob::new(job, self.strategy.clone()))
    }

    /// Begin consuming. Starting a running queue is a no-op.
    pub async fn start(&self) -> Result<(), JobQueueError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.strategy.start(&self.name, self.process.clone()).await {
            self.running.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Stop consuming, waiting for in-flight jobs.
    pub async fn stop(&self) -> Result<(), JobQueueError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.strategy.stop(&self.name).await
    }
}

/// Options for [`SubscribableJob::updates`].
#[derive(Debug, Clone, Copy)]
pub struct JobUpdateOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Emit `Err(JobFailed)` instead of the failed job.
    pub error_on_fail: bool,
}

impl Default for JobUpdateOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(60 * 60),
            error_on_fail: false,
        }
    }
}

/// A submitted job whose progress can be observed.
#[derive(Clone)]
pub struct SubscribableJob {
    job: Job,
    strategy: Arc<dyn JobQueueStrategy>,
}

impl std::fmt::Debug for SubscribableJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribableJob").field("job", &self.job).finish()
    }
}

impl SubscribableJob {
    pub(crate) fn new(job: Job, strategy: Arc<dyn JobQueueStrategy>) -> Self {
        Self { job, strategy }
    }

    /// The job as it was when submitted.
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn id(&self) -> Option<JobId> {
        self.job.id
    }

    /// Held by a buffer rather than persisted.
    pub fn is_buffered(&self) -> bool {
        self.job.id.is_none()
    }

    /// Poll the job and emit it whenever its state or progress changes.
    ///
    /// The stream ends after a settled job is emitted. On timeout an
    /// `Err(Timeout)` is emitted; the job itself keeps running. Buffered
    /// jobs yield a single `Err(NotPersisted)`.
    pub fn updates(&self, options: JobUpdateOptions) -> mpsc::Receiver<Result<Job, JobQueueError>> {
        let (tx, rx) = mpsc::channel(16);

        let Some(id) = self.job.id else {
            let _ = tx.try_send(Err(JobQueueError::NotPersisted));
            return rx;
        };

        let strategy = self.strategy.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + options.timeout;
            let mut last_seen: Option<(JobState, u8)> = None;

            loop {
                let job = match strategy.find_one(id).await {
                    Ok(Some(job)) => job,
                    Ok(None) => {
                        let _ = tx.send(Err(JobQueueError::JobNotFound(id))).await;
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };

                let snapshot = (job.state, job.progress);
                if last_seen != Some(snapshot) {
                    last_seen = Some(snapshot);
                    let settled = job.is_settled();

                    let update = if job.state == JobState::Failed && options.error_on_fail {
                        Err(JobQueueError::JobFailed {
                            job_id: id,
                            error: job.error.clone().unwrap_or_default(),
                        })
                    } else {
                        Ok(job)
                    };

                    if tx.send(update).await.is_err() || settled {
                        return;
                    }
                }

                let now = Instant::now();
                if now >= deadline {
                    let _ = tx
                        .send(Err(JobQueueError::Timeout {
                            job_id: id,
                            waited: options.timeout,
                        }))
                        .await;
                    return;
                }

                tokio::time::sleep(options.poll_interval.min(deadline - now)).await;
                if tx.is_closed() {
                    return;
                }
            }
        });

        rx
    }

    /// Wait until the job settles and return it.
    pub async fn wait_until_settled(&self, options: JobUpdateOptions) -> Result<Job, JobQueueError> {
        let mut updates = self.updates(options);
        let mut last = None;
        while let Some(update) = updates.recv().await {
            let job = update?;
            if job.is_settled() {
                return Ok(job);
            }
            last = Some(job);
        }
        match last.and_then(|j| j.id) {
            Some(id) => Err(JobQueueError::JobNotFound(id)),
            None => Err(JobQueueError::NotPersisted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::buffer::{InMemoryJobBufferStorage, JobBuffer};
    use crate::job_queue::polling::{InMemoryJobQueueStrategy, PollingConfig};
    use crate::job_queue::strategy::process_fn;
    use crate::job_queue::types::RetryPolicy;

    #[derive(Serialize)]
    struct Greeting {
        name: String,
    }

    fn fast() -> PollingConfig {
        PollingConfig::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_retry_policy(RetryPolicy::immediate())
    }

    fn fast_updates() -> JobUpdateOptions {
        JobUpdateOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
            error_on_fail: false,
        }
    }

    fn queue(process: ProcessFn) -> (JobQueue<Greeting>, Arc<JobBufferService>) {
        let strategy: Arc<dyn JobQueueStrategy> = Arc::new(InMemoryJobQueueStrategy::in_memory(fast()));
        let buffers = Arc::new(JobBufferService::new(
            Arc::new(InMemoryJobBufferStorage::new()),
            strategy.clone(),
        ));
        (
            JobQueue::new("greetings".into(), process, strategy, buffers.clone()),
            buffers,
        )
    }

    fn greeting(name: &str) -> Greeting {
        Greeting { name: name.into() }
    }

    #[test]
    fn debug_shows_name_and_running_flag() {
        let (queue, _) = queue(process_fn(|_job: Job| async move { Ok(serde_json::Value::Null) }));
        let rendered = format!("{queue:?}");
        assert!(rendered.contains("greetings"));
        assert!(rendered.contains("running: false"));
    }

    #[tokio::test]
    async fn added_jobs_are_processed_once_started() {
        let (queue, _) = queue(process_fn(|job: Job| async move {
            Ok(serde_json::json!(format!("hello {}", job.data["name"].as_str().unwrap_or_default())))
        }));
        queue.start().await.unwrap();
        assert!(queue.running());

        let handle = queue.add(greeting("ada"), JobOptions::default()).await.unwrap();
        assert!(!handle.is_buffered());

        let job = handle.wait_until_settled(fast_updates()).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result, Some(serde_json::json!("hello ada")));

        queue.stop().await.unwrap();
        assert!(!queue.running());
    }

    #[tokio::test]
    async fn failed_jobs_surface_as_errors_when_requested() {
        let (queue, _) = queue(process_fn(|_job: Job| async { anyhow::bail!("nope") }));
        queue.start().await.unwrap();

        let handle = queue.add(greeting("bob"), JobOptions::default()).await.unwrap();
        let err = handle
            .wait_until_settled(JobUpdateOptions {
                error_on_fail: true,
                ..fast_updates()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JobQueueError::JobFailed { ref error, .. } if error == "nope"));
        queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn timing_out_does_not_cancel_the_job() {
        let (queue, _) = queue(process_fn(|_job: Job| async { Ok(serde_json::Value::Null) }));
        // Never started, so the job stays pending.
        let handle = queue.add(greeting("cy"), JobOptions::default()).await.unwrap();

        let mut updates = handle.updates(JobUpdateOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(30),
            error_on_fail: false,
        });
        let first = updates.recv().await.unwrap().unwrap();
        assert_eq!(first.state, JobState::Pending);
        assert!(matches!(
            updates.recv().await.unwrap(),
            Err(JobQueueError::Timeout { .. })
        ));
        assert!(updates.recv().await.is_none());

        queue.start().await.unwrap();
        let job = handle.wait_until_settled(fast_updates()).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        queue.stop().await.unwrap();
    }

    struct HoldEverything;

    impl JobBuffer for HoldEverything {
        fn id(&self) -> &str {
            "hold"
        }

        fn collect(&self, _job: &Job) -> bool {
            true
        }

        fn reduce(&self, jobs: Vec<Job>) -> Vec<Job> {
            jobs
        }
    }

    #[tokio::test]
    async fn buffered_jobs_cannot_be_subscribed_to() {
        let (queue, buffers) = queue(process_fn(|_job: Job| async { Ok(serde_json::Value::Null) }));
        buffers.add_buffer(Arc::new(HoldEverything)).unwrap();

        let handle = queue.add(greeting("dee"), JobOptions::default()).await.unwrap();
        assert!(handle.is_buffered());

        let mut updates = handle.updates(fast_updates());
        assert_eq!(updates.recv().await, Some(Err(JobQueueError::NotPersisted)));
    }
}
