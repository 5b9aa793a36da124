//! Index writers: keep one search row per source entity in step with it.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use firelancer_core::{FacetId, RequestContext};
use firelancer_infra::collections::CollectionRepository;
use firelancer_infra::job_posts::{FacetValueRepository, JobPostRepository};
use firelancer_job_posts::{JobPost, JobPostId, JobPostState};

use crate::error::SearchResult;
use crate::strategy::SearchIndexStore;
use crate::types::{IndexFields, SearchIndexItem, SearchIndexName};

/// Writes the profile index from the fields callers pass in.
pub struct ProfileSearchService {
    store: Arc<dyn SearchIndexStore>,
}

impl ProfileSearchService {
    pub fn new(store: Arc<dyn SearchIndexStore>) -> Self {
        Self { store }
    }

    /// Update the row's denormalized fields, or insert a new row with no
    /// facets or collections.
    pub async fn update_search_index(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        title: &str,
        description: &str,
        enabled: bool,
    ) -> SearchResult<SearchIndexItem> {
        let item = match self.store.find(ctx.tenant_id(), SearchIndexName::Profile, id).await? {
            Some(mut existing) => {
                existing.title = title.to_string();
                existing.description = description.to_string();
                existing.enabled = enabled;
                existing
            }
            None => SearchIndexItem::new(id, ctx.tenant_id(), title, description, enabled, IndexFields::Profile),
        };
        self.store.upsert(&item).await?;
        debug!(tenant_id = %ctx.tenant_id(), profile_id = %id, enabled, "profile indexed");
        Ok(item)
    }

    pub async fn delete_search_index(&self, ctx: &RequestContext, id: Uuid) -> SearchResult<bool> {
        self.store.delete(ctx.tenant_id(), SearchIndexName::Profile, id).await
    }

    pub async fn find(&self, ctx: &RequestContext, id: Uuid) -> SearchResult<Option<SearchIndexItem>> {
        self.store.find(ctx.tenant_id(), SearchIndexName::Profile, id).await
    }
}

/// What [`JobPostSearchService::update_search_index`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// The post no longer exists (or was soft-deleted); its row is gone.
    Removed,
}

/// Rebuilds a job post's row from the live post and its catalog relations.
pub struct JobPostSearchService {
    store: Arc<dyn SearchIndexStore>,
    posts: Arc<dyn JobPostRepository>,
    facet_values: Arc<dyn FacetValueRepository>,
    collections: Arc<dyn CollectionRepository>,
}

impl JobPostSearchService {
    pub fn new(
        store: Arc<dyn SearchIndexStore>,
        posts: Arc<dyn JobPostRepository>,
        facet_values: Arc<dyn FacetValueRepository>,
        collections: Arc<dyn CollectionRepository>,
    ) -> Self {
        Self {
            store,
            posts,
            facet_values,
            collections,
        }
    }

    pub async fn update_search_index(&self, ctx: &RequestContext, id: JobPostId) -> SearchResult<IndexOutcome> {
        let Some(post) = self.posts.find_one(ctx.tenant_id(), id).await? else {
            self.delete_search_index(ctx, id).await?;
            return Ok(IndexOutcome::Removed);
        };
        let item = self.build_item(ctx, &post).await?;
        self.store.upsert(&item).await?;
        debug!(
            tenant_id = %ctx.tenant_id(),
            job_post_id = %id,
            state = %post.state(),
            enabled = item.enabled,
            "job post indexed"
        );
        Ok(IndexOutcome::Indexed)
    }

    pub async fn delete_search_index(&self, ctx: &RequestContext, id: JobPostId) -> SearchResult<bool> {
        let removed = self
            .store
            .delete(ctx.tenant_id(), SearchIndexName::JobPost, *id.0.as_uuid())
            .await?;
        if removed {
            info!(tenant_id = %ctx.tenant_id(), job_post_id = %id, "job post removed from search index");
        }
        Ok(removed)
    }

    async fn build_item(&self, ctx: &RequestContext, post: &JobPost) -> SearchResult<SearchIndexItem> {
        let values = self
            .facet_values
            .find_by_ids(ctx.tenant_id(), post.facet_value_ids())
            .await?;
        let collections = self
            .collections
            .find_by_ids(ctx.tenant_id(), post.collection_ids())
            .await?;

        let mut facet_ids: Vec<FacetId> = Vec::new();
        for value in &values {
            if !facet_ids.contains(&value.facet.id) {
                facet_ids.push(value.facet.id);
            }
        }

        let mut item = SearchIndexItem::new(
            *post.id_typed().0.as_uuid(),
            post.tenant_id(),
            post.title(),
            post.description(),
            post.state() == JobPostState::Open,
            IndexFields::JobPost {
                currency_code: post.budget().currency.as_str().to_string(),
                budget: post.budget().amount,
            },
        );
        item.facet_ids = facet_ids;
        item.facet_value_ids = post.facet_value_ids().to_vec();
        item.collection_ids = collections.iter().map(|c| c.id).collect();
        item.collection_slugs = collections.into_iter().map(|c| c.slug).collect();
        Ok(item)
    }
}
