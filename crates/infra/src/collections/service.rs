use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, info};

use firelancer_core::{CollectionId, DomainError, RequestContext};
use firelancer_job_posts::Collection;

use super::buffer::{APPLY_COLLECTION_FILTERS_QUEUE, ApplyCollectionFiltersJobData};
use super::repository::CollectionRepository;
use crate::job_posts::{JobPostListOptions, JobPostService, JobPostServiceError, Relations, RepositoryError};
use crate::job_queue::{JobOptions, JobQueue, JobQueueError, JobQueueService, SubscribableJob};

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    JobPost(#[from] JobPostServiceError),

    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

impl From<DomainError> for CollectionError {
    fn from(err: DomainError) -> Self {
        CollectionError::JobPost(err.into())
    }
}

/// Maintains collection membership of job posts.
pub struct CollectionService {
    collections: Arc<dyn CollectionRepository>,
    job_posts: Arc<JobPostService>,
    apply_filters: OnceLock<Arc<JobQueue<ApplyCollectionFiltersJobData>>>,
}

impl CollectionService {
    pub fn new(collections: Arc<dyn CollectionRepository>, job_posts: Arc<JobPostService>) -> Self {
        Self {
            collections,
            job_posts,
            apply_filters: OnceLock::new(),
        }
    }

    /// Create the `apply-collection-filters` queue processed by this service.
    pub async fn register_queue(self: &Arc<Self>, jobs: &JobQueueService) -> Result<(), CollectionError> {
        let service = Arc::clone(self);
        let queue = jobs
            .create_queue::<ApplyCollectionFiltersJobData, _, _>(APPLY_COLLECTION_FILTERS_QUEUE, move |job| {
                let service = service.clone();
                async move {
                    let data: ApplyCollectionFiltersJobData = job.data_as()?;
                    let updated = service
                        .apply_collection_filters(&data.ctx, &data.collection_ids)
                        .await?;
                    Ok(serde_json::json!({ "updated": updated }))
                }
            })
            .await?;
        // A second registration fails in create_queue before reaching here.
        let _ = self.apply_filters.set(queue);
        Ok(())
    }

    pub async fn find_all(&self, ctx: &RequestContext) -> Result<Vec<Collection>, CollectionError> {
        Ok(self.collections.find_all(ctx.tenant_id()).await?)
    }

    /// Save a collection and schedule re-evaluation of its members.
    ///
    /// Administrators only. Returns the scheduled job when the filter
    /// queue is registered.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        collection: Collection,
    ) -> Result<Option<SubscribableJob>, CollectionError> {
        if !ctx.is_admin() {
            return Err(DomainError::Forbidden.into());
        }
        self.collections.save(ctx.tenant_id(), &collection).await?;
        info!(tenant_id = %ctx.tenant_id(), collection_id = %collection.id, slug = %collection.slug, "collection saved");
        self.schedule_apply_filters(ctx, vec![collection.id]).await
    }

    /// Enqueue a filter run for `collection_ids`; `None` if no queue is registered.
    pub async fn schedule_apply_filters(
        &self,
        ctx: &RequestContext,
        collection_ids: Vec<CollectionId>,
    ) -> Result<Option<SubscribableJob>, CollectionError> {
        let Some(queue) = self.apply_filters.get() else {
            return Ok(None);
        };
        let data = ApplyCollectionFiltersJobData {
            ctx: ctx.clone(),
            collection_ids,
        };
        Ok(Some(queue.add(data, JobOptions::with_retries(3)).await?))
    }

    /// Re-evaluate membership of every live post in the given collections.
    ///
    /// Membership in other collections is left alone. Returns the number of
    /// posts whose collections changed.
    pub async fn apply_collection_filters(
        &self,
        ctx: &RequestContext,
        collection_ids: &[CollectionId],
    ) -> Result<usize, CollectionError> {
        let system = RequestContext::system(ctx.tenant_id());
        let collections = self.collections.find_by_ids(ctx.tenant_id(), collection_ids).await?;

        let mut updated = 0;
        let mut skip = 0;
        loop {
            let options = JobPostListOptions {
                skip,
                ..Default::default()
            };
            let page = self.job_posts.find_all(&system, &options, Relations::NONE).await?;
            if page.items.is_empty() {
                break;
            }
            skip += page.items.len();

            for detail in page.items {
                let post = detail.job_post;
                let mut next: Vec<CollectionId> = post
                    .collection_ids()
                    .iter()
                    .copied()
                    .filter(|id| !collection_ids.contains(id))
                    .collect();
                next.extend(
                    collections
                        .iter()
                        .filter(|c| c.matches(post.facet_value_ids()))
                        .map(|c| c.id),
                );

                if next != post.collection_ids() {
                    debug!(job_post_id = %post.id_typed(), collections = next.len(), "collection membership changed");
                    self.job_posts
                        .assign_collections(&system, post.id_typed(), next)
                        .await?;
                    updated += 1;
                }
            }

            if skip >= page.total_items {
                break;
            }
        }

        info!(tenant_id = %ctx.tenant_id(), collections = collection_ids.len(), updated, "collection filters applied");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::collections::repository::InMemoryCollectionRepository;
    use crate::job_posts::{
        CreateJobPostInput, FacetValueRepository, InMemoryAssetRepository, InMemoryFacetValueRepository,
        InMemoryJobPostRepository,
    };
    use crate::job_queue::{
        ErrorHandlers, InMemoryJobBufferStorage, InMemoryJobQueueStrategy, JobQueueServiceConfig, JobState,
        JobUpdateOptions, PollingConfig,
    };
    use firelancer_core::{CustomerId, FacetId, FacetValueId, TenantId, UserId};
    use firelancer_events::{EventEnvelope, InMemoryEventBus};
    use firelancer_job_posts::{Facet, FacetValue, JobPostEvent, JobPostProcess};

    struct Fixture {
        collections: Arc<CollectionService>,
        posts: Arc<JobPostService>,
        customer: RequestContext,
        admin: RequestContext,
        design: FacetValueId,
        logo: FacetValueId,
    }

    async fn fixture() -> Fixture {
        let tenant = TenantId::new();
        let facet_values = Arc::new(InMemoryFacetValueRepository::new());
        let skill = Facet {
            id: FacetId::new(),
            code: "skill".into(),
            name: "Skill".into(),
            is_private: false,
        };
        let mut ids = Vec::new();
        for code in ["design", "logo"] {
            let value = FacetValue {
                id: FacetValueId::new(),
                code: code.into(),
                name: code.into(),
                facet: skill.clone(),
            };
            facet_values.save(tenant, &value).await.unwrap();
            ids.push(value.id);
        }

        let bus: Arc<InMemoryEventBus<EventEnvelope<JobPostEvent>>> = Arc::new(InMemoryEventBus::new());
        let posts = Arc::new(JobPostService::new(
            Arc::new(InMemoryJobPostRepository::new()),
            facet_values,
            Arc::new(InMemoryAssetRepository::new()),
            bus,
            JobPostProcess::default(),
        ));
        let collections = Arc::new(CollectionService::new(
            Arc::new(InMemoryCollectionRepository::new()),
            posts.clone(),
        ));

        Fixture {
            collections,
            posts,
            customer: RequestContext::customer(tenant, CustomerId::new()),
            admin: RequestContext::administrator(tenant, UserId::new()),
            design: ids[0],
            logo: ids[1],
        }
    }

    fn post_with(facets: Vec<FacetValueId>) -> CreateJobPostInput {
        CreateJobPostInput {
            title: "Post".into(),
            budget: 10,
            currency_code: "EUR".into(),
            facet_value_ids: facets,
            ..Default::default()
        }
    }

    fn collection(filter: Vec<FacetValueId>) -> Collection {
        Collection {
            id: CollectionId::new(),
            slug: "logo-design".into(),
            name: "Logo design".into(),
            filter_facet_value_ids: filter,
        }
    }

    #[tokio::test]
    async fn matching_posts_join_and_stale_members_leave() {
        let fx = fixture().await;
        let both = fx.posts.create(&fx.customer, post_with(vec![fx.design, fx.logo])).await.unwrap();
        let design_only = fx.posts.create(&fx.customer, post_with(vec![fx.design])).await.unwrap();

        let mut logos = collection(vec![fx.design, fx.logo]);
        assert!(fx.collections.save(&fx.admin, logos.clone()).await.unwrap().is_none());

        let updated = fx.collections.apply_collection_filters(&fx.admin, &[logos.id]).await.unwrap();
        assert_eq!(updated, 1);

        let member = fx.posts.find_one(&fx.admin, both.job_post.id_typed(), Relations::NONE).await.unwrap().unwrap();
        assert_eq!(member.job_post.collection_ids(), &[logos.id]);
        let outsider = fx.posts.find_one(&fx.admin, design_only.job_post.id_typed(), Relations::NONE).await.unwrap().unwrap();
        assert!(outsider.job_post.collection_ids().is_empty());

        // Re-running is a no-op; narrowing the filter moves membership.
        assert_eq!(fx.collections.apply_collection_filters(&fx.admin, &[logos.id]).await.unwrap(), 0);
        logos.filter_facet_value_ids = vec![fx.design];
        fx.collections.save(&fx.admin, logos.clone()).await.unwrap();
        assert_eq!(fx.collections.apply_collection_filters(&fx.admin, &[logos.id]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn customers_cannot_save_collections() {
        let fx = fixture().await;
        let err = fx.collections.save(&fx.customer, collection(vec![fx.design])).await.unwrap_err();
        assert!(matches!(err, CollectionError::JobPost(JobPostServiceError::Domain(DomainError::Forbidden))));
    }

    #[tokio::test]
    async fn saving_schedules_a_filter_job_on_the_queue() {
        let fx = fixture().await;
        let strategy = Arc::new(InMemoryJobQueueStrategy::in_memory(
            PollingConfig::default().with_poll_interval(Duration::from_millis(10)),
        ));
        let jobs = JobQueueService::new(
            strategy,
            Arc::new(InMemoryJobBufferStorage::new()),
            ErrorHandlers::default(),
            JobQueueServiceConfig::default(),
        );
        fx.collections.register_queue(&jobs).await.unwrap();
        jobs.start().await.unwrap();

        let post = fx.posts.create(&fx.customer, post_with(vec![fx.design])).await.unwrap();
        let job = fx
            .collections
            .save(&fx.admin, collection(vec![fx.design]))
            .await
            .unwrap()
            .expect("queue registered");

        let settled = job
            .wait_until_settled(JobUpdateOptions {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
                error_on_fail: true,
            })
            .await
            .unwrap();
        assert_eq!(settled.state, JobState::Completed);
        assert_eq!(settled.result, Some(serde_json::json!({ "updated": 1 })));

        let member = fx.posts.find_one(&fx.admin, post.job_post.id_typed(), Relations::NONE).await.unwrap().unwrap();
        assert_eq!(member.job_post.collection_ids().len(), 1);
        jobs.stop().await.unwrap();
    }
}
