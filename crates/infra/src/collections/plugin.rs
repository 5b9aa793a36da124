use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

use firelancer_events::EventEnvelope;
use firelancer_job_posts::JobPostEvent;

use super::buffer::{APPLY_COLLECTION_FILTERS_QUEUE, CollectionJobBuffer};
use super::service::{CollectionError, CollectionService};
use crate::plugin::{Plugin, PluginContext};
use crate::workers::EventWorker;

/// Keeps collection membership in step with job-post facet values.
///
/// Registers the filter queue and re-applies every tenant collection when a
/// post is created or edited. With `buffer_updates` the resulting jobs are
/// merged by [`CollectionJobBuffer`] until flushed.
pub struct CollectionPlugin {
    service: Arc<CollectionService>,
    buffer_updates: bool,
}

impl CollectionPlugin {
    pub fn new(service: Arc<CollectionService>, buffer_updates: bool) -> Self {
        Self {
            service,
            buffer_updates,
        }
    }
}

async fn on_job_post_event(
    service: Arc<CollectionService>,
    envelope: EventEnvelope<JobPostEvent>,
) -> Result<(), CollectionError> {
    if !matches!(envelope.payload(), JobPostEvent::Created(_) | JobPostEvent::Edited(_)) {
        return Ok(());
    }
    let ctx = envelope.ctx();
    let ids: Vec<_> = service.find_all(ctx).await?.into_iter().map(|c| c.id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    debug!(tenant_id = %ctx.tenant_id(), collections = ids.len(), "scheduling collection filters");
    service.schedule_apply_filters(ctx, ids).await?;
    Ok(())
}

#[async_trait]
impl Plugin for CollectionPlugin {
    fn name(&self) -> &'static str {
        "collections"
    }

    async fn on_bootstrap(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        self.service.register_queue(&ctx.job_queue).await?;

        if self.buffer_updates {
            let queue_name = ctx.job_queue.config().queue_name(APPLY_COLLECTION_FILTERS_QUEUE);
            ctx.job_queue
                .add_buffer(Arc::new(CollectionJobBuffer::new(queue_name)))?;
        }

        let service = self.service.clone();
        let worker = EventWorker::spawn(
            "collections-events",
            ctx.events.clone(),
            Handle::current(),
            None,
            move |envelope: EventEnvelope<JobPostEvent>| on_job_post_event(service.clone(), envelope),
        )?;
        ctx.register_worker(worker);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::collections::repository::InMemoryCollectionRepository;
    use crate::config::FirelancerConfig;
    use crate::job_posts::{
        CreateJobPostInput, InMemoryAssetRepository, InMemoryFacetValueRepository, InMemoryJobPostRepository,
        JobPostService,
    };
    use crate::job_queue::{
        ErrorHandlers, InMemoryJobBufferStorage, InMemoryJobQueueStrategy, JobQueueService, JobQueueServiceConfig,
        PollingConfig,
    };
    use crate::plugin::bootstrap_plugins;
    use firelancer_core::{CollectionId, CustomerId, FacetValueId, RequestContext, TenantId, UserId};
    use firelancer_events::InMemoryEventBus;
    use firelancer_job_posts::{Collection, JobPostProcess};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn job_post_events_feed_the_collection_buffer() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JobPostEvent>>> = Arc::new(InMemoryEventBus::new());
        let repo = Arc::new(InMemoryJobPostRepository::new());
        let posts = Arc::new(JobPostService::new(
            repo.clone(),
            Arc::new(InMemoryFacetValueRepository::new()),
            Arc::new(InMemoryAssetRepository::new()),
            bus.clone(),
            JobPostProcess::default(),
        ));
        let collections = Arc::new(CollectionService::new(Arc::new(InMemoryCollectionRepository::new()), posts.clone()));
        let jobs = Arc::new(JobQueueService::new(
            Arc::new(InMemoryJobQueueStrategy::in_memory(PollingConfig::default())),
            Arc::new(InMemoryJobBufferStorage::new()),
            ErrorHandlers::default(),
            JobQueueServiceConfig::default(),
        ));

        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(CollectionPlugin::new(collections.clone(), true))];
        let ctx = Arc::new(PluginContext::new(Arc::new(FirelancerConfig::default()), jobs.clone(), bus, repo));
        bootstrap_plugins(&plugins, &ctx).await.unwrap();
        assert_eq!(ctx.worker_count(), 1);

        let tenant = TenantId::new();
        let admin = RequestContext::administrator(tenant, UserId::new());
        let customer = RequestContext::customer(tenant, CustomerId::new());
        let saved = collections
            .save(
                &admin,
                Collection {
                    id: CollectionId::new(),
                    slug: "all".into(),
                    name: "All".into(),
                    filter_facet_value_ids: vec![FacetValueId::new()],
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(saved.is_buffered());

        for title in ["One", "Two"] {
            let input = CreateJobPostInput {
                title: title.into(),
                budget: 5,
                currency_code: "USD".into(),
                ..Default::default()
            };
            posts.create(&customer, input).await.unwrap();
        }

        let buffer = vec![CollectionJobBuffer::ID.to_string()];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while jobs.buffer_size(&buffer).await.unwrap()[CollectionJobBuffer::ID] < 3 {
            assert!(tokio::time::Instant::now() < deadline, "events were not buffered");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let submitted = jobs.flush(&buffer).await.unwrap();
        assert_eq!(submitted.len(), 1);

        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || ctx.shutdown()).await.unwrap();
    }
}
