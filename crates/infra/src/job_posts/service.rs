//! Job-post application service: lookups, creation and every lifecycle
//! mutation, with ownership checks and event publishing.
//!
//! Mutations check, in order: the post exists (else `EntityNotFound`), the
//! caller may act on it (else `Forbidden`), the transition is allowed by the
//! configured process (else `InvalidTransition`).

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use firelancer_core::{
    AggregateRoot, AssetId, CollectionId, CurrencyCode, DomainError, ExpectedVersion,
    FacetValueId, Money, RequestContext,
};
use firelancer_events::{EventBus, EventEnvelope, InMemoryBusError};
use firelancer_job_posts::{
    Asset, AssignCollections, CreateJobPost, EditJobPost, FacetValue, JobPost, JobPostAction,
    JobPostCommand, JobPostEvent, JobPostId, JobPostPatch, JobPostProcess, TransitionJobPost,
    Visibility,
};

use super::filter::{JobPostListOptions, PaginatedList};
use super::repository::{AssetRepository, FacetValueRepository, JobPostRepository, RepositoryError};

/// The bus job-post events are published on.
pub type JobPostEventBus = dyn EventBus<EventEnvelope<JobPostEvent>, Error = InMemoryBusError>;

pub const JOB_POST_AGGREGATE: &str = "job_post";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobPostServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to publish event: {0}")]
    Publish(String),
}

impl From<RepositoryError> for JobPostServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => JobPostServiceError::Domain(DomainError::Conflict(msg)),
            RepositoryError::Storage(msg) | RepositoryError::Serialization(msg) => {
                JobPostServiceError::Storage(msg)
            }
        }
    }
}

pub type JobPostServiceResult<T> = Result<T, JobPostServiceError>;

/// Related entities to hydrate. Facet values always come with their facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relations {
    pub assets: bool,
    pub facet_values: bool,
}

impl Relations {
    pub const NONE: Relations = Relations {
        assets: false,
        facet_values: false,
    };

    pub const ALL: Relations = Relations {
        assets: true,
        facet_values: true,
    };

    /// Parse a comma-separated relation list, e.g. `assets,facetValues.facet`.
    pub fn parse(csv: &str) -> Result<Relations, DomainError> {
        let mut relations = Relations::NONE;
        for name in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "assets" => relations.assets = true,
                "facetValues" | "facet_values" | "facetValues.facet" | "facet_values.facet" => {
                    relations.facet_values = true
                }
                other => return Err(DomainError::user_input(format!("unknown relation: {other}"))),
            }
        }
        Ok(relations)
    }
}

impl Default for Relations {
    fn default() -> Self {
        Relations::ALL
    }
}

/// A job post with its requested relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPostDetail {
    #[serde(flatten)]
    pub job_post: JobPost,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<Asset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet_values: Option<Vec<FacetValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobPostInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: i64,
    pub currency_code: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub asset_ids: Vec<AssetId>,
    #[serde(default)]
    pub facet_value_ids: Vec<FacetValueId>,
    #[serde(default)]
    pub required_skill_ids: Vec<FacetValueId>,
    #[serde(default)]
    pub required_category_id: Option<FacetValueId>,
    #[serde(default)]
    pub required_experience_id: Option<FacetValueId>,
    #[serde(default)]
    pub required_job_duration_id: Option<FacetValueId>,
    #[serde(default)]
    pub required_job_scope_id: Option<FacetValueId>,
}

impl CreateJobPostInput {
    /// Generic facet values followed by the typed requirement fields.
    pub fn all_facet_value_ids(&self) -> Vec<FacetValueId> {
        let mut ids = self.facet_value_ids.clone();
        ids.extend(self.required_skill_ids.iter().copied());
        ids.extend(
            [
                self.required_category_id,
                self.required_experience_id,
                self.required_job_duration_id,
                self.required_job_scope_id,
            ]
            .into_iter()
            .flatten(),
        );
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobPostInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget: Option<i64>,
    /// Defaults to the current currency when only `budget` is given.
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub asset_ids: Option<Vec<AssetId>>,
    #[serde(default)]
    pub facet_value_ids: Option<Vec<FacetValueId>>,
}

pub struct JobPostService {
    posts: Arc<dyn JobPostRepository>,
    facet_values: Arc<dyn FacetValueRepository>,
    assets: Arc<dyn AssetRepository>,
    events: Arc<JobPostEventBus>,
    process: JobPostProcess,
}

impl JobPostService {
    pub fn new(
        posts: Arc<dyn JobPostRepository>,
        facet_values: Arc<dyn FacetValueRepository>,
        assets: Arc<dyn AssetRepository>,
        events: Arc<JobPostEventBus>,
        process: JobPostProcess,
    ) -> Self {
        Self {
            posts,
            facet_values,
            assets,
            events,
            process,
        }
    }

    pub fn process(&self) -> &JobPostProcess {
        &self.process
    }

    pub fn repository(&self) -> &Arc<dyn JobPostRepository> {
        &self.posts
    }

    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        options: &JobPostListOptions,
        relations: Relations,
    ) -> JobPostServiceResult<PaginatedList<JobPostDetail>> {
        let page = self.posts.find_all(ctx.tenant_id(), options).await?;
        let mut items = Vec::with_capacity(page.items.len());
        for post in page.items {
            items.push(self.hydrate(ctx, post, relations).await?);
        }
        Ok(PaginatedList {
            items,
            total_items: page.total_items,
        })
    }

    pub async fn find_one(
        &self,
        ctx: &RequestContext,
        id: JobPostId,
        relations: Relations,
    ) -> JobPostServiceResult<Option<JobPostDetail>> {
        match self.posts.find_one(ctx.tenant_id(), id).await? {
            Some(post) => Ok(Some(self.hydrate(ctx, post, relations).await?)),
            None => Ok(None),
        }
    }

    /// Create a `DRAFT` post owned by the calling customer.
    pub async fn create(&self, ctx: &RequestContext, input: CreateJobPostInput) -> JobPostServiceResult<JobPostDetail> {
        let customer_id = ctx.require_customer()?;
        let facet_value_ids = input.all_facet_value_ids();
        self.resolve_facet_values(ctx, &facet_value_ids).await?;
        self.resolve_assets(ctx, &input.asset_ids).await?;

        let currency: CurrencyCode = input.currency_code.parse()?;
        let cmd = CreateJobPost {
            tenant_id: ctx.tenant_id(),
            job_post_id: JobPostId::generate(),
            customer_id,
            title: input.title,
            description: input.description,
            budget: Money::new(input.budget, currency)?,
            visibility: input.visibility,
            asset_ids: input.asset_ids,
            facet_value_ids,
            collection_ids: Vec::new(),
            occurred_at: Utc::now(),
        };

        let (post, event) = JobPost::create(&cmd)?;
        self.posts.save(&post, ExpectedVersion::Exact(0)).await?;
        self.publish_events(ctx, &post, 0, vec![event])?;
        info!(
            tenant_id = %ctx.tenant_id(),
            job_post_id = %post.id_typed(),
            customer_id = %customer_id,
            "job post created"
        );

        self.find_one(ctx, post.id_typed(), Relations::ALL)
            .await?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: JobPostId,
        input: UpdateJobPostInput,
    ) -> JobPostServiceResult<JobPost> {
        let post = self.load_owned(ctx, id).await?;

        if let Some(ids) = &input.facet_value_ids {
            self.resolve_facet_values(ctx, ids).await?;
        }
        if let Some(ids) = &input.asset_ids {
            self.resolve_assets(ctx, ids).await?;
        }

        let budget = match (input.budget, input.currency_code) {
            (None, None) => None,
            (amount, code) => {
                let currency = match code {
                    Some(code) => code.parse::<CurrencyCode>()?,
                    None => post.budget().currency.clone(),
                };
                Some(Money::new(amount.unwrap_or(post.budget().amount), currency)?)
            }
        };

        let patch = JobPostPatch {
            title: input.title,
            description: input.description,
            budget,
            visibility: input.visibility,
            asset_ids: input.asset_ids,
            facet_value_ids: input.facet_value_ids,
        };
        let command = JobPostCommand::Edit(EditJobPost {
            patch,
            occurred_at: Utc::now(),
        });
        self.execute(ctx, post, &command).await
    }

    pub async fn publish(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_owned(ctx, id, JobPostAction::Publish).await
    }

    pub async fn resubmit(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_owned(ctx, id, JobPostAction::Resubmit).await
    }

    pub async fn close(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_owned(ctx, id, JobPostAction::Close).await
    }

    /// Soft delete: the post moves to `DRAFT_DELETED` and disappears from reads.
    pub async fn delete_draft(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_owned(ctx, id, JobPostAction::DeleteDraft).await
    }

    pub async fn approve(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_as_admin(ctx, id, JobPostAction::Approve).await
    }

    pub async fn reject(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.transition_as_admin(ctx, id, JobPostAction::Reject).await
    }

    /// Replace the collections a post belongs to (system/admin only).
    pub async fn assign_collections(
        &self,
        ctx: &RequestContext,
        id: JobPostId,
        collection_ids: Vec<CollectionId>,
    ) -> JobPostServiceResult<JobPost> {
        let post = self.load(ctx, id).await?;
        if !ctx.is_admin() {
            return Err(DomainError::Forbidden.into());
        }
        let command = JobPostCommand::AssignCollections(AssignCollections {
            collection_ids,
            occurred_at: Utc::now(),
        });
        self.execute(ctx, post, &command).await
    }

    async fn transition_owned(
        &self,
        ctx: &RequestContext,
        id: JobPostId,
        action: JobPostAction,
    ) -> JobPostServiceResult<JobPost> {
        let post = self.load_owned(ctx, id).await?;
        self.transition(ctx, post, action).await
    }

    async fn transition_as_admin(
        &self,
        ctx: &RequestContext,
        id: JobPostId,
        action: JobPostAction,
    ) -> JobPostServiceResult<JobPost> {
        let post = self.load(ctx, id).await?;
        if !ctx.is_admin() {
            return Err(DomainError::Forbidden.into());
        }
        self.transition(ctx, post, action).await
    }

    async fn transition(&self, ctx: &RequestContext, post: JobPost, action: JobPostAction) -> JobPostServiceResult<JobPost> {
        let command = JobPostCommand::Transition(TransitionJobPost {
            action,
            occurred_at: Utc::now(),
        });
        let from = post.state();
        let post = self.execute(ctx, post, &command).await?;
        info!(
            tenant_id = %ctx.tenant_id(),
            job_post_id = %post.id_typed(),
            action = ?action,
            from = %from,
            to = %post.state(),
            "job post transitioned"
        );
        Ok(post)
    }

    async fn load(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        self.posts
            .find_one(ctx.tenant_id(), id)
            .await?
            .ok_or_else(|| DomainError::entity_not_found("JobPost", id).into())
    }

    async fn load_owned(&self, ctx: &RequestContext, id: JobPostId) -> JobPostServiceResult<JobPost> {
        let post = self.load(ctx, id).await?;
        let customer_id = ctx.require_customer()?;
        if !post.is_owned_by(customer_id) {
            return Err(DomainError::Forbidden.into());
        }
        Ok(post)
    }

    /// Handle `command`, persist the result and publish its events.
    async fn execute(
        &self,
        ctx: &RequestContext,
        post: JobPost,
        command: &JobPostCommand,
    ) -> JobPostServiceResult<JobPost> {
        let events = post.handle(&self.process, command)?;
        if events.is_empty() {
            return Ok(post);
        }

        let stored_version = post.version();
        let mut next = post;
        for event in &events {
            next.apply(event);
        }

        self.posts
            .save(&next, ExpectedVersion::Exact(stored_version))
            .await?;
        self.publish_events(ctx, &next, stored_version, events)?;
        Ok(next)
    }

    fn publish_events(
        &self,
        ctx: &RequestContext,
        post: &JobPost,
        stored_version: u64,
        events: Vec<JobPostEvent>,
    ) -> JobPostServiceResult<()> {
        for (i, event) in events.into_iter().enumerate() {
            let envelope = EventEnvelope::new(
                ctx.clone(),
                post.id_typed().0,
                JOB_POST_AGGREGATE,
                stored_version + i as u64 + 1,
                event,
            );
            self.events
                .publish(envelope)
                .map_err(|e| JobPostServiceError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }

    async fn resolve_facet_values(
        &self,
        ctx: &RequestContext,
        ids: &[FacetValueId],
    ) -> JobPostServiceResult<Vec<FacetValue>> {
        let found = self.facet_values.find_by_ids(ctx.tenant_id(), ids).await?;
        if let Some(missing) = ids.iter().find(|id| !found.iter().any(|v| v.id == **id)) {
            return Err(DomainError::entity_not_found("FacetValue", missing).into());
        }
        Ok(found)
    }

    async fn resolve_assets(&self, ctx: &RequestContext, ids: &[AssetId]) -> JobPostServiceResult<Vec<Asset>> {
        let found = self.assets.find_by_ids(ctx.tenant_id(), ids).await?;
        if let Some(missing) = ids.iter().find(|id| !found.iter().any(|a| a.id == **id)) {
            return Err(DomainError::entity_not_found("Asset", missing).into());
        }
        Ok(found)
    }

    async fn hydrate(
        &self,
        ctx: &RequestContext,
        post: JobPost,
        relations: Relations,
    ) -> JobPostServiceResult<JobPostDetail> {
        let assets = if relations.assets {
            Some(self.assets.find_by_ids(ctx.tenant_id(), post.asset_ids()).await?)
        } else {
            None
        };

        let facet_values = if relations.facet_values {
            let mut values = self
                .facet_values
                .find_by_ids(ctx.tenant_id(), post.facet_value_ids())
                .await?;
            // Private facets are only visible to administrators.
            if !ctx.is_admin() {
                values.retain(FacetValue::is_public);
            }
            Some(values)
        } else {
            None
        };

        Ok(JobPostDetail {
            job_post: post,
            assets,
            facet_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job_posts::filter::JobPostFilter;
    use crate::job_posts::repository::{
        InMemoryAssetRepository, InMemoryFacetValueRepository, InMemoryJobPostRepository,
    };
    use firelancer_core::{CustomerId, FacetId, TenantId, UserId};
    use firelancer_events::{Event, InMemoryEventBus, Subscription};
    use firelancer_job_posts::{Facet, JobPostState};

    struct Fixture {
        service: JobPostService,
        events: Subscription<EventEnvelope<JobPostEvent>>,
        tenant: TenantId,
        owner: RequestContext,
        skills: Vec<FacetValueId>,
        private_value: FacetValueId,
    }

    fn facet_value(facet: &Facet, code: &str) -> FacetValue {
        FacetValue {
            id: FacetValueId::new(),
            code: code.into(),
            name: code.into(),
            facet: facet.clone(),
        }
    }

    async fn fixture(process: JobPostProcess) -> Fixture {
        let tenant = TenantId::new();
        let facet_values = Arc::new(InMemoryFacetValueRepository::new());
        let skill = Facet {
            id: FacetId::new(),
            code: "skill".into(),
            name: "Skill".into(),
            is_private: false,
        };
        let internal = Facet {
            id: FacetId::new(),
            code: "internal".into(),
            name: "Internal".into(),
            is_private: true,
        };

        let mut skills = Vec::new();
        for code in ["design", "branding", "illustration"] {
            let value = facet_value(&skill, code);
            facet_values.save(tenant, &value).await.unwrap();
            skills.push(value.id);
        }
        let private = facet_value(&internal, "flagged");
        facet_values.save(tenant, &private).await.unwrap();

        let bus: Arc<InMemoryEventBus<EventEnvelope<JobPostEvent>>> = Arc::new(InMemoryEventBus::new());
        let events = bus.subscribe();
        let service = JobPostService::new(
            Arc::new(InMemoryJobPostRepository::new()),
            facet_values,
            Arc::new(InMemoryAssetRepository::new()),
            bus,
            process,
        );

        Fixture {
            service,
            events,
            tenant,
            owner: RequestContext::customer(tenant, CustomerId::new()),
            skills,
            private_value: private.id,
        }
    }

    fn logo_input(skills: &[FacetValueId]) -> CreateJobPostInput {
        CreateJobPostInput {
            title: "Build a logo".into(),
            description: "Vector logo for a bakery".into(),
            budget: 100,
            currency_code: "USD".into(),
            required_skill_ids: skills.to_vec(),
            ..Default::default()
        }
    }

    fn drain(events: &Subscription<EventEnvelope<JobPostEvent>>) -> Vec<EventEnvelope<JobPostEvent>> {
        let mut out = Vec::new();
        while let Ok(e) = events.recv_timeout(Duration::from_millis(10)) {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn create_then_publish_goes_to_moderation() {
        let fx = fixture(JobPostProcess::moderated()).await;

        let created = fx.service.create(&fx.owner, logo_input(&fx.skills)).await.unwrap();
        let post = &created.job_post;
        assert_eq!(post.state(), JobPostState::Draft);
        assert_eq!(post.facet_value_ids(), fx.skills.as_slice());
        assert_eq!(created.facet_values.as_ref().map(Vec::len), Some(3));

        let published = fx.service.publish(&fx.owner, post.id_typed()).await.unwrap();
        assert_eq!(published.state(), JobPostState::Requested);
        assert!(published.published_at().is_some());
        assert!(published.closed_at().is_none());

        let events = drain(&fx.events);
        let types: Vec<_> = events.iter().map(|e| e.payload().event_type()).collect();
        assert_eq!(types, vec!["job_post.created", "job_post.published"]);
        let sequence: Vec<_> = events.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequence, vec![1, 2]);
        assert!(events.iter().all(|e| e.aggregate_type() == JOB_POST_AGGREGATE));
    }

    #[tokio::test]
    async fn skipping_moderation_opens_immediately() {
        let fx = fixture(JobPostProcess::without_moderation()).await;
        let id = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();
        let post = fx.service.publish(&fx.owner, id).await.unwrap();
        assert_eq!(post.state(), JobPostState::Open);
    }

    #[tokio::test]
    async fn unknown_facet_values_fail_creation() {
        let fx = fixture(JobPostProcess::default()).await;
        let mut input = logo_input(&fx.skills);
        input.required_category_id = Some(FacetValueId::new());

        let err = fx.service.create(&fx.owner, input).await.unwrap_err();
        assert!(matches!(
            err,
            JobPostServiceError::Domain(DomainError::EntityNotFound { entity: "FacetValue", .. })
        ));
    }

    #[tokio::test]
    async fn only_customers_create_posts() {
        let fx = fixture(JobPostProcess::default()).await;
        let admin = RequestContext::administrator(fx.tenant, UserId::new());
        let err = fx.service.create(&admin, logo_input(&[])).await.unwrap_err();
        assert_eq!(err, JobPostServiceError::Domain(DomainError::Forbidden));
    }

    #[tokio::test]
    async fn other_customers_are_forbidden_from_every_mutation() {
        let fx = fixture(JobPostProcess::default()).await;
        let id = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();
        let intruder = RequestContext::customer(fx.tenant, CustomerId::new());

        let forbidden = JobPostServiceError::Domain(DomainError::Forbidden);
        assert_eq!(fx.service.publish(&intruder, id).await.unwrap_err(), forbidden);
        assert_eq!(fx.service.close(&intruder, id).await.unwrap_err(), forbidden);
        assert_eq!(fx.service.resubmit(&intruder, id).await.unwrap_err(), forbidden);
        assert_eq!(fx.service.delete_draft(&intruder, id).await.unwrap_err(), forbidden);
        assert_eq!(
            fx.service
                .update(
                    &intruder,
                    id,
                    UpdateJobPostInput {
                        title: Some("Mine now".into()),
                        ..Default::default()
                    }
                )
                .await
                .unwrap_err(),
            forbidden
        );
        // Customers cannot moderate, even their own posts.
        assert_eq!(fx.service.approve(&fx.owner, id).await.unwrap_err(), forbidden);

        let post = fx.service.find_one(&fx.owner, id, Relations::NONE).await.unwrap().unwrap();
        assert_eq!(post.job_post.state(), JobPostState::Draft);
        assert_eq!(post.job_post.title(), "Build a logo");
    }

    #[tokio::test]
    async fn missing_posts_are_reported_before_ownership() {
        let fx = fixture(JobPostProcess::default()).await;
        let intruder = RequestContext::customer(fx.tenant, CustomerId::new());
        let err = fx.service.publish(&intruder, JobPostId::generate()).await.unwrap_err();
        assert!(matches!(
            err,
            JobPostServiceError::Domain(DomainError::EntityNotFound { entity: "JobPost", .. })
        ));
    }

    #[tokio::test]
    async fn invalid_transitions_leave_the_post_unchanged() {
        let fx = fixture(JobPostProcess::moderated()).await;
        let id = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();

        let err = fx.service.close(&fx.owner, id).await.unwrap_err();
        assert!(matches!(
            err,
            JobPostServiceError::Domain(DomainError::InvalidTransition { .. })
        ));
        let post = fx.service.find_one(&fx.owner, id, Relations::NONE).await.unwrap().unwrap();
        assert_eq!(post.job_post.state(), JobPostState::Draft);
        assert_eq!(post.job_post.version(), 1);
    }

    #[tokio::test]
    async fn moderation_round_trip() {
        let fx = fixture(JobPostProcess::moderated()).await;
        let admin = RequestContext::administrator(fx.tenant, UserId::new());
        let id = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();

        fx.service.publish(&fx.owner, id).await.unwrap();
        let rejected = fx.service.reject(&admin, id).await.unwrap();
        assert_eq!(rejected.state(), JobPostState::Rejected);
        assert!(rejected.rejected_at().is_some());

        fx.service.resubmit(&fx.owner, id).await.unwrap();
        let open = fx.service.approve(&admin, id).await.unwrap();
        assert_eq!(open.state(), JobPostState::Open);

        let closed = fx.service.close(&fx.owner, id).await.unwrap();
        assert_eq!(closed.state(), JobPostState::Closed);
        assert!(closed.closed_at().is_some());
    }

    #[tokio::test]
    async fn deleted_drafts_disappear_from_reads() {
        let fx = fixture(JobPostProcess::default()).await;
        let keep = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();
        let gone = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();

        let deleted = fx.service.delete_draft(&fx.owner, gone).await.unwrap();
        assert!(deleted.deleted_at().is_some());

        assert!(fx.service.find_one(&fx.owner, gone, Relations::NONE).await.unwrap().is_none());
        let page = fx
            .service
            .find_all(&fx.owner, &JobPostListOptions::default(), Relations::NONE)
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].job_post.id_typed(), keep);

        let err = fx.service.publish(&fx.owner, gone).await.unwrap_err();
        assert!(matches!(
            err,
            JobPostServiceError::Domain(DomainError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn edits_update_fields_and_keep_the_currency() {
        let fx = fixture(JobPostProcess::default()).await;
        let id = fx.service.create(&fx.owner, logo_input(&[])).await.unwrap().job_post.id_typed();

        let edited = fx
            .service
            .update(
                &fx.owner,
                id,
                UpdateJobPostInput {
                    title: Some("  Build two logos ".into()),
                    budget: Some(250),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.title(), "Build two logos");
        assert_eq!(edited.budget().amount, 250);
        assert_eq!(edited.budget().currency.as_str(), "USD");
        assert!(edited.edited_at().is_some());
    }

    #[tokio::test]
    async fn private_facet_values_are_hidden_from_customers() {
        let fx = fixture(JobPostProcess::default()).await;
        let mut input = logo_input(&fx.skills[..1]);
        input.facet_value_ids = vec![fx.private_value];
        let id = fx.service.create(&fx.owner, input).await.unwrap().job_post.id_typed();

        let as_owner = fx.service.find_one(&fx.owner, id, Relations::ALL).await.unwrap().unwrap();
        assert_eq!(as_owner.facet_values.unwrap().len(), 1);

        let admin = RequestContext::administrator(fx.tenant, UserId::new());
        let as_admin = fx.service.find_one(&admin, id, Relations::ALL).await.unwrap().unwrap();
        assert_eq!(as_admin.facet_values.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn find_all_composes_ownership_with_caller_filters() {
        let fx = fixture(JobPostProcess::default()).await;
        let other = RequestContext::customer(fx.tenant, CustomerId::new());
        fx.service.create(&fx.owner, logo_input(&[])).await.unwrap();
        let mut input = logo_input(&[]);
        input.title = "Write a blog post".into();
        fx.service.create(&fx.owner, input.clone()).await.unwrap();
        fx.service.create(&other, input).await.unwrap();

        let owner_id = fx.owner.require_customer().unwrap();
        let options = JobPostListOptions {
            filter: Some(JobPostFilter::TitleContains("blog".into())),
            ..Default::default()
        }
        .restricted_to_customer(owner_id);

        let page = fx.service.find_all(&fx.owner, &options, Relations::NONE).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert!(page.items[0].job_post.is_owned_by(owner_id));
    }

    #[test]
    fn relation_names_are_validated() {
        assert_eq!(Relations::parse("assets,facetValues.facet").unwrap(), Relations::ALL);
        assert_eq!(Relations::parse("").unwrap(), Relations::NONE);
        assert!(matches!(Relations::parse("owner"), Err(DomainError::UserInput(_))));
    }
}
