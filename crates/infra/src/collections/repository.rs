use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use firelancer_core::{CollectionId, FacetValueId, TenantId};
use firelancer_job_posts::Collection;

use crate::job_posts::repository::{RepositoryError, map_sqlx_error};

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Collections in the order of `ids`. Unknown ids are skipped.
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[CollectionId]) -> Result<Vec<Collection>, RepositoryError>;

    async fn find_all(&self, tenant_id: TenantId) -> Result<Vec<Collection>, RepositoryError>;

    async fn save(&self, tenant_id: TenantId, collection: &Collection) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCollectionRepository {
    collections: RwLock<Vec<(TenantId, Collection)>>,
}

impl InMemoryCollectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("collection repository lock poisoned".to_string())
}

#[async_trait]
impl CollectionRepository for InMemoryCollectionRepository {
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[CollectionId]) -> Result<Vec<Collection>, RepositoryError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                collections
                    .iter()
                    .find(|(t, c)| *t == tenant_id && c.id == *id)
                    .map(|(_, c)| c.clone())
            })
            .collect())
    }

    async fn find_all(&self, tenant_id: TenantId) -> Result<Vec<Collection>, RepositoryError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .iter()
            .filter(|(t, _)| *t == tenant_id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn save(&self, tenant_id: TenantId, collection: &Collection) -> Result<(), RepositoryError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        match collections
            .iter_mut()
            .find(|(t, c)| *t == tenant_id && c.id == collection.id)
        {
            Some((_, existing)) => *existing = collection.clone(),
            None => collections.push((tenant_id, collection.clone())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCollectionRepository {
    pool: Arc<PgPool>,
}

impl PostgresCollectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: Uuid,
    slug: String,
    name: String,
    filter_facet_value_ids: Vec<Uuid>,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Collection {
            id: CollectionId::from_uuid(row.id),
            slug: row.slug,
            name: row.name,
            filter_facet_value_ids: row
                .filter_facet_value_ids
                .into_iter()
                .map(FacetValueId::from_uuid)
                .collect(),
        }
    }
}

#[async_trait]
impl CollectionRepository for PostgresCollectionRepository {
    #[instrument(skip(self, ids), fields(tenant_id = %tenant_id, count = ids.len()), err)]
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[CollectionId]) -> Result<Vec<Collection>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<CollectionRow> = sqlx::query_as(
            r#"
            SELECT id, slug, name, filter_facet_value_ids
            FROM collections
            WHERE tenant_id = $1 AND id = ANY($2)
            ORDER BY array_position($2, id)
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_collections", e))?;

        Ok(rows.into_iter().map(Collection::from).collect())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_all(&self, tenant_id: TenantId) -> Result<Vec<Collection>, RepositoryError> {
        let rows: Vec<CollectionRow> = sqlx::query_as(
            r#"
            SELECT id, slug, name, filter_facet_value_ids
            FROM collections
            WHERE tenant_id = $1
            ORDER BY slug ASC, id ASC
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_collections", e))?;

        Ok(rows.into_iter().map(Collection::from).collect())
    }

    #[instrument(skip(self, collection), fields(tenant_id = %tenant_id, collection_id = %collection.id), err)]
    async fn save(&self, tenant_id: TenantId, collection: &Collection) -> Result<(), RepositoryError> {
        let filter: Vec<Uuid> = collection
            .filter_facet_value_ids
            .iter()
            .map(|id| *id.as_uuid())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO collections (id, tenant_id, slug, name, filter_facet_value_ids)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                filter_facet_value_ids = EXCLUDED.filter_facet_value_ids
            "#,
        )
        .bind(*collection.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(&collection.slug)
        .bind(&collection.name)
        .bind(filter)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_collection", e))?;

        Ok(())
    }
}

