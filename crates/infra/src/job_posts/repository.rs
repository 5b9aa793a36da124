//! Job-post persistence ports and their in-memory adapters.
//!
//! Every read is tenant-scoped and only ever returns live posts: a post in
//! `DRAFT_DELETED` or with `deleted_at` set is invisible to `find_*`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use firelancer_core::{AggregateRoot, AssetId, ExpectedVersion, FacetValueId, TenantId};
use firelancer_job_posts::{Asset, FacetValue, JobPost, JobPostId, JobPostState};

use super::filter::{JobPostListOptions, PaginatedList};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Conflict(format!("duplicate key in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::Database(db_err) => {
            RepositoryError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Serialization(format!("failed to decode row in {}: {}", operation, err))
        }
        _ => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

pub(crate) fn is_live(post: &JobPost) -> bool {
    !post.is_deleted() && post.state() != JobPostState::DraftDeleted
}

#[async_trait]
pub trait JobPostRepository: Send + Sync {
    /// A live post by id.
    async fn find_one(&self, tenant_id: TenantId, id: JobPostId) -> Result<Option<JobPost>, RepositoryError>;

    /// Live posts matching `options`, with the unpaginated total.
    async fn find_all(
        &self,
        tenant_id: TenantId,
        options: &JobPostListOptions,
    ) -> Result<PaginatedList<JobPost>, RepositoryError>;

    /// Insert or update `post`.
    ///
    /// `expected` is the version currently stored (`Exact(0)` = must not exist).
    async fn save(&self, post: &JobPost, expected: ExpectedVersion) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FacetValueRepository: Send + Sync {
    /// Values with their facet, in the order of `ids`. Unknown ids are skipped.
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[FacetValueId]) -> Result<Vec<FacetValue>, RepositoryError>;

    async fn save(&self, tenant_id: TenantId, value: &FacetValue) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Assets in the order of `ids`. Unknown ids are skipped.
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[AssetId]) -> Result<Vec<Asset>, RepositoryError>;

    async fn save(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), RepositoryError>;
}

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("repository lock poisoned".to_string())
}

/// In-memory job-post repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobPostRepository {
    posts: RwLock<HashMap<(TenantId, JobPostId), JobPost>>,
}

impl InMemoryJobPostRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobPostRepository for InMemoryJobPostRepository {
    async fn find_one(&self, tenant_id: TenantId, id: JobPostId) -> Result<Option<JobPost>, RepositoryError> {
        let posts = self.posts.read().map_err(|_| poisoned())?;
        Ok(posts.get(&(tenant_id, id)).filter(|p| is_live(p)).cloned())
    }

    async fn find_all(
        &self,
        tenant_id: TenantId,
        options: &JobPostListOptions,
    ) -> Result<PaginatedList<JobPost>, RepositoryError> {
        let posts = self.posts.read().map_err(|_| poisoned())?;
        let mut matching: Vec<JobPost> = posts
            .iter()
            .filter(|((t, _), p)| *t == tenant_id && is_live(p))
            .map(|(_, p)| p)
            .filter(|p| options.filter.as_ref().is_none_or(|f| f.matches(p)))
            .cloned()
            .collect();

        let sort = options.sort.unwrap_or_default();
        matching.sort_by(|a, b| sort.compare(a, b));

        let total_items = matching.len();
        let items = matching
            .into_iter()
            .skip(options.skip)
            .take(options.take())
            .collect();
        Ok(PaginatedList { items, total_items })
    }

    async fn save(&self, post: &JobPost, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut posts = self.posts.write().map_err(|_| poisoned())?;
        let key = (post.tenant_id(), post.id_typed());
        let current = posts.get(&key).map_or(0, |p| p.version());
        expected
            .check(current)
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        posts.insert(key, post.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFacetValueRepository {
    values: RwLock<HashMap<(TenantId, FacetValueId), FacetValue>>,
}

impl InMemoryFacetValueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FacetValueRepository for InMemoryFacetValueRepository {
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[FacetValueId]) -> Result<Vec<FacetValue>, RepositoryError> {
        let values = self.values.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| values.get(&(tenant_id, *id)).cloned())
            .collect())
    }

    async fn save(&self, tenant_id: TenantId, value: &FacetValue) -> Result<(), RepositoryError> {
        self.values
            .write()
            .map_err(|_| poisoned())?
            .insert((tenant_id, value.id), value.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAssetRepository {
    assets: RwLock<HashMap<(TenantId, AssetId), Asset>>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[AssetId]) -> Result<Vec<Asset>, RepositoryError> {
        let assets = self.assets.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| assets.get(&(tenant_id, *id)).cloned())
            .collect())
    }

    async fn save(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), RepositoryError> {
        self.assets
            .write()
            .map_err(|_| poisoned())?
            .insert((tenant_id, asset.id), asset.clone());
        Ok(())
    }
}
