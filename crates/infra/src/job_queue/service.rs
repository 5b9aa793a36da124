//! Top-level facade over queues, buffers and the queue strategy.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::buffer::{JobBuffer, JobBufferService, JobBufferStorageStrategy};
use super::error::JobQueueError;
use super::error_handler::ErrorHandlers;
use super::polling::panic_message;
use super::queue::JobQueue;
use super::strategy::{JobQueueStrategy, process_fn};
use super::types::Job;

/// Queue naming and activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueServiceConfig {
    /// Prepended to every queue name, isolating deployments sharing storage.
    pub prefix: Option<String>,
    /// Queues this process consumes. Empty = all.
    pub active_queues: Vec<String>,
}

impl JobQueueServiceConfig {
    pub fn queue_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }

    /// Whether the (prefixed) queue should be consumed here. The allow-list
    /// may name either the prefixed or the plain queue name.
    pub fn should_start(&self, queue_name: &str) -> bool {
        if self.active_queues.is_empty() {
            return true;
        }
        let plain = self
            .prefix
            .as_deref()
            .and_then(|p| queue_name.strip_prefix(p))
            .unwrap_or(queue_name);
        self.active_queues
            .iter()
            .any(|q| q == queue_name || q == plain)
    }
}

/// `{name, running}` status pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueInfo {
    pub name: String,
    pub running: bool,
}

#[async_trait]
trait ManagedQueue: Send + Sync {
    fn name(&self) -> &str;
    fn running(&self) -> bool;
    async fn start(&self) -> Result<(), JobQueueError>;
    async fn stop(&self) -> Result<(), JobQueueError>;
}

#[async_trait]
impl<D: Serialize + Send + Sync + 'static> ManagedQueue for JobQueue<D> {
    fn name(&self) -> &str {
        JobQueue::name(self)
    }

    fn running(&self) -> bool {
        JobQueue::running(self)
    }

    async fn start(&self) -> Result<(), JobQueueError> {
        JobQueue::start(self).await
    }

    async fn stop(&self) -> Result<(), JobQueueError> {
        JobQueue::stop(self).await
    }
}

/// Creates queues, starts/stops them together, and manages buffers.
pub struct JobQueueService {
    strategy: Arc<dyn JobQueueStrategy>,
    buffers: Arc<JobBufferService>,
    error_handlers: ErrorHandlers,
    config: JobQueueServiceConfig,
    queues: RwLock<Vec<Arc<dyn ManagedQueue>>>,
    started: AtomicBool,
}

impl JobQueueService {
    pub fn new(
        strategy: Arc<dyn JobQueueStrategy>,
        buffer_storage: Arc<dyn JobBufferStorageStrategy>,
        error_handlers: ErrorHandlers,
        config: JobQueueServiceConfig,
    ) -> Self {
        let buffers = Arc::new(JobBufferService::new(buffer_storage, strategy.clone()));
        Self {
            strategy,
            buffers,
            error_handlers,
            config,
            queues: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &JobQueueServiceConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn JobQueueStrategy> {
        &self.strategy
    }

    pub fn error_handlers(&self) -> &ErrorHandlers {
        &self.error_handlers
    }

    fn snapshot(&self) -> Result<Vec<Arc<dyn ManagedQueue>>, JobQueueError> {
        self.queues
            .read()
            .map(|q| q.clone())
            .map_err(|_| JobQueueError::Storage("queue registry lock poisoned".to_string()))
    }

    /// Create a queue named `name` (plus the configured prefix).
    ///
    /// Errors returned by `process`, and panics inside it, are reported to
    /// every error handler before failing the attempt. If the service is already started the
    /// queue starts immediately (subject to the active-queue list).
    pub async fn create_queue<D, F, Fut>(&self, name: &str, process: F) -> Result<Arc<JobQueue<D>>, JobQueueError>
    where
        D: Serialize + Send + Sync + 'static,
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let queue_name = self.config.queue_name(name);
        let handlers = self.error_handlers.clone();
        let wrapped = process_fn(move |job: Job| {
            let fut = process(job.clone());
            let handlers = handlers.clone();
            async move {
                let outcome = match tokio::spawn(fut).await {
                    Ok(outcome) => outcome,
                    Err(join_err) if join_err.is_panic() => {
                        Err(anyhow::anyhow!(panic_message(join_err.into_panic())))
                    }
                    Err(join_err) => Err(anyhow::anyhow!("job task aborted: {join_err}")),
                };
                if let Err(err) = &outcome {
                    handlers.report_worker_error(&format!("{err:#}"), &job);
                }
                outcome
            }
        });

        let queue = Arc::new(JobQueue::<D>::new(
            queue_name.clone(),
            wrapped,
            self.strategy.clone(),
            self.buffers.clone(),
        ));

        {
            let mut queues = self
                .queues
                .write()
                .map_err(|_| JobQueueError::Storage("queue registry lock poisoned".to_string()))?;
            if queues.iter().any(|q| q.name() == queue_name) {
                return Err(JobQueueError::QueueAlreadyExists(queue_name));
            }
            queues.push(queue.clone());
        }
        info!(queue = %queue_name, "job queue created");

        if self.started.load(Ordering::SeqCst) && self.config.should_start(&queue_name) {
            queue.start().await?;
        }
        Ok(queue)
    }

    /// Start every queue allowed by the active-queue list.
    pub async fn start(&self) -> Result<(), JobQueueError> {
        self.started.store(true, Ordering::SeqCst);
        for queue in self.snapshot()? {
            if self.config.should_start(queue.name()) {
                queue.start().await?;
                info!(queue = queue.name(), "job queue started");
            } else {
                info!(queue = queue.name(), "job queue not in active list, skipped");
            }
        }
        Ok(())
    }

    /// Stop every queue, waiting for in-flight jobs.
    pub async fn stop(&self) -> Result<(), JobQueueError> {
        self.started.store(false, Ordering::SeqCst);
        for queue in self.snapshot()? {
            if let Err(err) = queue.stop().await {
                warn!(queue = queue.name(), error = %err, "failed to stop job queue");
            }
        }
        Ok(())
    }

    pub fn get_job_queues(&self) -> Result<Vec<JobQueueInfo>, JobQueueError> {
        Ok(self
            .snapshot()?
            .iter()
            .map(|q| JobQueueInfo {
                name: q.name().to_string(),
                running: q.running(),
            })
            .collect())
    }

    pub fn add_buffer(&self, buffer: Arc<dyn JobBuffer>) -> Result<(), JobQueueError> {
        self.buffers.add_buffer(buffer)
    }

    pub fn remove_buffer(&self, buffer_id: &str) -> Result<bool, JobQueueError> {
        self.buffers.remove_buffer(buffer_id)
    }

    pub fn active_buffer_ids(&self) -> Result<Vec<String>, JobQueueError> {
        self.buffers.active_buffer_ids()
    }

    pub async fn buffer_size(&self, buffer_ids: &[String]) -> Result<HashMap<String, usize>, JobQueueError> {
        self.buffers.buffer_size(buffer_ids).await
    }

    pub async fn flush(&self, buffer_ids: &[String]) -> Result<Vec<Job>, JobQueueError> {
        self.buffers.flush(buffer_ids).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::job_queue::buffer::InMemoryJobBufferStorage;
    use crate::job_queue::error_handler::ErrorHandlerStrategy;
    use crate::job_queue::polling::{InMemoryJobQueueStrategy, PollingConfig};
    use crate::job_queue::queue::JobUpdateOptions;
    use crate::job_queue::types::{JobOptions, JobState, RetryPolicy};

    #[derive(Default)]
    struct Collecting(Mutex<Vec<String>>);

    #[async_trait]
    impl ErrorHandlerStrategy for Collecting {
        async fn handle_worker_error(&self, error: &str, _job: &Job) {
            self.0.lock().unwrap().push(error.to_string());
        }

        async fn handle_server_error(&self, _error: &str, _host: &str) {}
    }

    fn service(config: JobQueueServiceConfig, handler: Arc<Collecting>) -> JobQueueService {
        let strategy = InMemoryJobQueueStrategy::in_memory(
            PollingConfig::default()
                .with_poll_interval(Duration::from_millis(5))
                .with_retry_policy(RetryPolicy::immediate()),
        );
        JobQueueService::new(
            Arc::new(strategy),
            Arc::new(InMemoryJobBufferStorage::new()),
            ErrorHandlers::new(vec![handler as Arc<dyn ErrorHandlerStrategy>]),
            config,
        )
    }

    fn updates() -> JobUpdateOptions {
        JobUpdateOptions {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
            error_on_fail: false,
        }
    }

    #[test]
    fn active_queue_list_accepts_prefixed_or_plain_names() {
        let config = JobQueueServiceConfig {
            prefix: Some("staging-".into()),
            active_queues: vec!["update-search-index".into(), "staging-emails".into()],
        };
        assert_eq!(config.queue_name("emails"), "staging-emails");
        assert!(config.should_start("staging-update-search-index"));
        assert!(config.should_start("staging-emails"));
        assert!(!config.should_start("staging-apply-collection-filters"));

        assert!(JobQueueServiceConfig::default().should_start("anything"));
    }

    #[tokio::test]
    async fn worker_errors_reach_handlers_and_still_fail_the_job() {
        let handler = Arc::new(Collecting::default());
        let service = service(JobQueueServiceConfig::default(), handler.clone());
        let queue = service
            .create_queue::<serde_json::Value, _, _>("failing", |_job| async { anyhow::bail!("exploded") })
            .await
            .unwrap();
        service.start().await.unwrap();

        let job = queue
            .add(serde_json::json!({}), JobOptions::default())
            .await
            .unwrap()
            .wait_until_settled(updates())
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Failed);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*handler.0.lock().unwrap(), vec!["exploded".to_string()]);
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_jobs_reach_handlers_and_fail_the_job() {
        let handler = Arc::new(Collecting::default());
        let service = service(JobQueueServiceConfig::default(), handler.clone());
        let queue = service
            .create_queue::<serde_json::Value, _, _>("panicking", |_job| async {
                if true {
                    panic!("kaboom");
                }
                Ok(serde_json::Value::Null)
            })
            .await
            .unwrap();
        service.start().await.unwrap();

        let job = queue
            .add(serde_json::json!({}), JobOptions::default())
            .await
            .unwrap()
            .wait_until_settled(updates())
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("job panicked: kaboom"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*handler.0.lock().unwrap(), vec!["job panicked: kaboom".to_string()]);
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn queues_outside_the_active_list_are_not_started() {
        let config = JobQueueServiceConfig {
            prefix: None,
            active_queues: vec!["a".into(), "c".into()],
        };
        let service = service(config, Arc::new(Collecting::default()));
        let noop = |_job: Job| async { Ok(serde_json::Value::Null) };
        service.create_queue::<(), _, _>("a", noop).await.unwrap();
        service.create_queue::<(), _, _>("b", noop).await.unwrap();

        service.start().await.unwrap();
        // Created after start, so it starts right away.
        service.create_queue::<(), _, _>("c", noop).await.unwrap();

        let status = service.get_job_queues().unwrap();
        assert_eq!(
            status,
            vec![
                JobQueueInfo { name: "a".into(), running: true },
                JobQueueInfo { name: "b".into(), running: false },
                JobQueueInfo { name: "c".into(), running: true },
            ]
        );

        service.stop().await.unwrap();
        assert!(service.get_job_queues().unwrap().iter().all(|q| !q.running));
    }

    #[tokio::test]
    async fn duplicate_queue_names_are_rejected() {
        let service = service(JobQueueServiceConfig::default(), Arc::new(Collecting::default()));
        let noop = |_job: Job| async { Ok(serde_json::Value::Null) };
        service.create_queue::<(), _, _>("dup", noop).await.unwrap();
        let err = service.create_queue::<(), _, _>("dup", noop).await.unwrap_err();
        assert_eq!(err, JobQueueError::QueueAlreadyExists("dup".into()));
    }
}
