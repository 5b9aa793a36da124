use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use firelancer_core::RequestContext;
use firelancer_events::EventEnvelope;
use firelancer_infra::job_queue::{JobOptions, JobQueue, JobQueueService, SubscribableJob};
use firelancer_infra::plugin::{Plugin, PluginContext};
use firelancer_infra::workers::EventWorker;
use firelancer_job_posts::{JobPostEvent, JobPostId};

use crate::buffer::{SearchIndexJobBuffer, UPDATE_SEARCH_INDEX_QUEUE, UpdateSearchIndexJobData};
use crate::error::SearchResult;
use crate::writers::{JobPostSearchService, ProfileSearchService};

/// Routes index updates through the `update-search-index` queue.
pub struct SearchIndexer {
    job_posts: Arc<JobPostSearchService>,
    profiles: Arc<ProfileSearchService>,
    queue: OnceLock<Arc<JobQueue<UpdateSearchIndexJobData>>>,
}

impl SearchIndexer {
    pub fn new(job_posts: Arc<JobPostSearchService>, profiles: Arc<ProfileSearchService>) -> Self {
        Self {
            job_posts,
            profiles,
            queue: OnceLock::new(),
        }
    }

    pub async fn register_queue(self: &Arc<Self>, jobs: &JobQueueService) -> SearchResult<()> {
        let indexer = Arc::clone(self);
        let queue = jobs
            .create_queue::<UpdateSearchIndexJobData, _, _>(UPDATE_SEARCH_INDEX_QUEUE, move |job| {
                let indexer = indexer.clone();
                async move {
                    let data: UpdateSearchIndexJobData = job.data_as()?;
                    Ok(indexer.process(data).await?)
                }
            })
            .await?;
        let _ = self.queue.set(queue);
        Ok(())
    }

    /// Enqueue (or buffer) an update; `None` if no queue is registered.
    pub async fn enqueue(&self, data: UpdateSearchIndexJobData) -> SearchResult<Option<SubscribableJob>> {
        let Some(queue) = self.queue.get() else {
            warn!(kind = data.type_name(), "search index queue not registered, update dropped");
            return Ok(None);
        };
        Ok(Some(queue.add(data, JobOptions::with_retries(3)).await?))
    }

    pub async fn update_job_post(&self, ctx: &RequestContext, job_post_id: JobPostId) -> SearchResult<Option<SubscribableJob>> {
        self.enqueue(UpdateSearchIndexJobData::UpdateJobPost {
            ctx: ctx.clone(),
            job_post_id,
        })
        .await
    }

    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        profile_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        enabled: bool,
    ) -> SearchResult<Option<SubscribableJob>> {
        self.enqueue(UpdateSearchIndexJobData::UpdateProfile {
            ctx: ctx.clone(),
            profile_id,
            title: title.into(),
            description: description.into(),
            enabled,
        })
        .await
    }

    pub async fn delete_profile(&self, ctx: &RequestContext, profile_id: Uuid) -> SearchResult<Option<SubscribableJob>> {
        self.enqueue(UpdateSearchIndexJobData::DeleteProfile {
            ctx: ctx.clone(),
            profile_id,
        })
        .await
    }

    /// Apply one update to the index. Returns the job result.
    pub async fn process(&self, data: UpdateSearchIndexJobData) -> SearchResult<serde_json::Value> {
        debug!(kind = data.type_name(), tenant_id = %data.ctx().tenant_id(), "processing search index job");
        match data {
            UpdateSearchIndexJobData::UpdateJobPost { ctx, job_post_id } => {
                let outcome = self.job_posts.update_search_index(&ctx, job_post_id).await?;
                Ok(serde_json::json!({ "jobPostId": job_post_id, "outcome": format!("{outcome:?}") }))
            }
            UpdateSearchIndexJobData::DeleteJobPost { ctx, job_post_id } => {
                let removed = self.job_posts.delete_search_index(&ctx, job_post_id).await?;
                Ok(serde_json::json!({ "jobPostId": job_post_id, "removed": removed }))
            }
            UpdateSearchIndexJobData::UpdateProfile {
                ctx,
                profile_id,
                title,
                description,
                enabled,
            } => {
                self.profiles
                    .update_search_index(&ctx, profile_id, &title, &description, enabled)
                    .await?;
                Ok(serde_json::json!({ "profileId": profile_id }))
            }
            UpdateSearchIndexJobData::DeleteProfile { ctx, profile_id } => {
                let removed = self.profiles.delete_search_index(&ctx, profile_id).await?;
                Ok(serde_json::json!({ "profileId": profile_id, "removed": removed }))
            }
        }
    }
}

/// Keeps the search index in step with job posts.
///
/// Every job-post event enqueues an `update-job-post` job. With
/// `search.buffer_updates` those jobs are collapsed by
/// [`SearchIndexJobBuffer`] until flushed.
pub struct SearchPlugin {
    indexer: Arc<SearchIndexer>,
}

impl SearchPlugin {
    pub fn new(indexer: Arc<SearchIndexer>) -> Self {
        Self { indexer }
    }
}

async fn on_job_post_event(indexer: Arc<SearchIndexer>, envelope: EventEnvelope<JobPostEvent>) -> SearchResult<()> {
    let job_post_id = envelope.payload().job_post_id();
    let system = RequestContext::system(envelope.tenant_id());
    indexer.update_job_post(&system, job_post_id).await?;
    Ok(())
}

#[async_trait]
impl Plugin for SearchPlugin {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn on_bootstrap(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        self.indexer.register_queue(&ctx.job_queue).await?;

        if ctx.config.search.buffer_updates {
            let queue_name = ctx.job_queue.config().queue_name(UPDATE_SEARCH_INDEX_QUEUE);
            ctx.job_queue
                .add_buffer(Arc::new(SearchIndexJobBuffer::new(queue_name)))?;
        }

        let indexer = self.indexer.clone();
        let worker = EventWorker::spawn(
            "search-index-events",
            ctx.events.clone(),
            Handle::current(),
            None,
            move |envelope: EventEnvelope<JobPostEvent>| on_job_post_event(indexer.clone(), envelope),
        )?;
        ctx.register_worker(worker);
        Ok(())
    }
}
