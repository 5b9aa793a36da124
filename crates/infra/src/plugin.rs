//! Plugin descriptor.
//!
//! Plugins are plain values registered in a list at startup. Each may adjust
//! the configuration before services are built, then wire itself into the
//! running system (queues, buffers, event workers) on bootstrap.

use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use async_trait::async_trait;
use tracing::info;

use crate::config::FirelancerConfig;
use crate::job_posts::{JobPostEventBus, JobPostRepository};
use crate::job_queue::JobQueueService;
use crate::workers::WorkerHandle;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Adjust configuration before any service is built.
    fn configure(&self, _config: &mut FirelancerConfig) {}

    /// Wire into the running system. Called once, before queues start.
    async fn on_bootstrap(&self, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// What a plugin may reach during bootstrap.
pub struct PluginContext {
    pub config: Arc<FirelancerConfig>,
    pub job_queue: Arc<JobQueueService>,
    pub events: Arc<JobPostEventBus>,
    pub job_posts: Arc<dyn JobPostRepository>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl PluginContext {
    pub fn new(
        config: Arc<FirelancerConfig>,
        job_queue: Arc<JobQueueService>,
        events: Arc<JobPostEventBus>,
        job_posts: Arc<dyn JobPostRepository>,
    ) -> Self {
        Self {
            config,
            job_queue,
            events,
            job_posts,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Keep a background worker alive until [`PluginContext::shutdown`].
    pub fn register_worker(&self, worker: WorkerHandle) {
        match self.workers.lock() {
            Ok(mut workers) => workers.push(worker),
            Err(poisoned) => poisoned.into_inner().push(worker),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Stop every registered worker. Blocks until they have exited.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            let name = worker.name();
            worker.shutdown();
            info!(worker = name, "worker stopped");
        }
    }
}

/// Let every plugin adjust `config`, in registration order.
pub fn configure_plugins(plugins: &[Arc<dyn Plugin>], config: &mut FirelancerConfig) {
    for plugin in plugins {
        plugin.configure(config);
    }
}

/// Bootstrap every plugin in registration order, stopping at the first failure.
pub async fn bootstrap_plugins(plugins: &[Arc<dyn Plugin>], ctx: &PluginContext) -> anyhow::Result<()> {
    for plugin in plugins {
        plugin
            .on_bootstrap(ctx)
            .await
            .with_context(|| format!("plugin {} failed to bootstrap", plugin.name()))?;
        info!(plugin = plugin.name(), "plugin bootstrapped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_posts::InMemoryJobPostRepository;
    use crate::job_queue::{
        ErrorHandlers, InMemoryJobBufferStorage, InMemoryJobQueueStrategy, JobQueueServiceConfig, PollingConfig,
    };
    use firelancer_events::{EventEnvelope, InMemoryEventBus};
    use firelancer_job_posts::JobPostEvent;

    struct Prefixing;

    #[async_trait]
    impl Plugin for Prefixing {
        fn name(&self) -> &'static str {
            "prefixing"
        }

        fn configure(&self, config: &mut FirelancerConfig) {
            config.job_queue.service.prefix = Some("test-".into());
        }

        async fn on_bootstrap(&self, ctx: &PluginContext) -> anyhow::Result<()> {
            ctx.job_queue
                .create_queue::<u32, _, _>("noop", |_job| async { Ok(serde_json::Value::Null) })
                .await?;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn on_bootstrap(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            anyhow::bail!("missing credentials")
        }
    }

    fn context(config: FirelancerConfig) -> PluginContext {
        let queues = JobQueueService::new(
            Arc::new(InMemoryJobQueueStrategy::in_memory(PollingConfig::default())),
            Arc::new(InMemoryJobBufferStorage::new()),
            ErrorHandlers::default(),
            JobQueueServiceConfig {
                prefix: config.job_queue.service.prefix.clone(),
                ..Default::default()
            },
        );
        let bus: Arc<InMemoryEventBus<EventEnvelope<JobPostEvent>>> = Arc::new(InMemoryEventBus::new());
        PluginContext::new(Arc::new(config), Arc::new(queues), bus, Arc::new(InMemoryJobPostRepository::new()))
    }

    #[tokio::test]
    async fn plugins_configure_then_bootstrap_in_order() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Prefixing)];
        let mut config = FirelancerConfig::default();
        configure_plugins(&plugins, &mut config);
        assert_eq!(config.job_queue.service.prefix.as_deref(), Some("test-"));

        let ctx = context(config);
        bootstrap_plugins(&plugins, &ctx).await.unwrap();
        let names: Vec<_> = ctx.job_queue.get_job_queues().unwrap().into_iter().map(|q| q.name).collect();
        assert_eq!(names, vec!["test-noop"]);
    }

    #[tokio::test]
    async fn bootstrap_errors_name_the_plugin() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Failing), Arc::new(Prefixing)];
        let ctx = context(FirelancerConfig::default());

        let err = bootstrap_plugins(&plugins, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("failing"));
        assert!(ctx.job_queue.get_job_queues().unwrap().is_empty());
    }
}
