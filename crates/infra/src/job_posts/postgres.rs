//! Postgres adapters for job posts, facet values and assets.
//!
//! `job_posts` keeps the queryable columns next to a `data` JSONB snapshot of
//! the whole aggregate, which is what reads deserialize.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use firelancer_core::{AggregateRoot, AssetId, ExpectedVersion, FacetId, FacetValueId, TenantId};
use firelancer_job_posts::{Asset, Facet, FacetValue, JobPost, JobPostId};

use super::filter::{JobPostListOptions, PaginatedList, visibility_str};
use super::repository::{
    AssetRepository, FacetValueRepository, JobPostRepository, RepositoryError, map_sqlx_error,
};

const LIVE: &str = "deleted_at IS NULL AND state <> 'DRAFT_DELETED'";

const INSERT_SQL: &str = r#"
    INSERT INTO job_posts (
        id, tenant_id, customer_id, title, description, budget, currency_code,
        visibility, state, facet_value_ids, collection_ids,
        created_at, updated_at, published_at, closed_at, rejected_at, edited_at, deleted_at,
        version, data
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
"#;

const UPSERT_SUFFIX: &str = r#"
    ON CONFLICT (id) DO UPDATE SET
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        budget = EXCLUDED.budget,
        currency_code = EXCLUDED.currency_code,
        visibility = EXCLUDED.visibility,
        state = EXCLUDED.state,
        facet_value_ids = EXCLUDED.facet_value_ids,
        collection_ids = EXCLUDED.collection_ids,
        updated_at = EXCLUDED.updated_at,
        published_at = EXCLUDED.published_at,
        closed_at = EXCLUDED.closed_at,
        rejected_at = EXCLUDED.rejected_at,
        edited_at = EXCLUDED.edited_at,
        deleted_at = EXCLUDED.deleted_at,
        version = EXCLUDED.version,
        data = EXCLUDED.data
"#;

const UPDATE_SQL: &str = r#"
    UPDATE job_posts SET
        customer_id = $3,
        title = $4,
        description = $5,
        budget = $6,
        currency_code = $7,
        visibility = $8,
        state = $9,
        facet_value_ids = $10,
        collection_ids = $11,
        created_at = $12,
        updated_at = $13,
        published_at = $14,
        closed_at = $15,
        rejected_at = $16,
        edited_at = $17,
        deleted_at = $18,
        version = $19,
        data = $20
    WHERE id = $1 AND tenant_id = $2 AND version = $21
"#;

#[derive(Debug, Clone)]
pub struct PostgresJobPostRepository {
    pool: Arc<PgPool>,
}

impl PostgresJobPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn push_where(qb: &mut QueryBuilder<'static, Postgres>, tenant_id: TenantId, options: &JobPostListOptions) {
        qb.push(" WHERE tenant_id = ")
            .push_bind(*tenant_id.as_uuid())
            .push(" AND ")
            .push(LIVE);
        if let Some(filter) = &options.filter {
            qb.push(" AND ");
            filter.push_sql(qb);
        }
    }

    /// Page query for `find_all` (exposed for SQL inspection).
    pub fn list_query(tenant_id: TenantId, options: &JobPostListOptions) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT data FROM job_posts");
        Self::push_where(&mut qb, tenant_id, options);
        options.sort.unwrap_or_default().push_sql(&mut qb);
        qb.push(" LIMIT ")
            .push_bind(options.take() as i64)
            .push(" OFFSET ")
            .push_bind(options.skip as i64);
        qb
    }

    pub fn count_query(tenant_id: TenantId, options: &JobPostListOptions) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM job_posts");
        Self::push_where(&mut qb, tenant_id, options);
        qb
    }
}

fn decode_post(data: serde_json::Value) -> Result<JobPost, RepositoryError> {
    serde_json::from_value(data).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn bind_post<'q>(
    query: Query<'q, Postgres, PgArguments>,
    post: &JobPost,
    data: serde_json::Value,
) -> Query<'q, Postgres, PgArguments> {
    let facet_value_ids: Vec<Uuid> = post.facet_value_ids().iter().map(|id| *id.as_uuid()).collect();
    let collection_ids: Vec<Uuid> = post.collection_ids().iter().map(|id| *id.as_uuid()).collect();

    query
        .bind(*post.id_typed().0.as_uuid())
        .bind(*post.tenant_id().as_uuid())
        .bind(*post.customer_id().as_uuid())
        .bind(post.title().to_string())
        .bind(post.description().to_string())
        .bind(post.budget().amount)
        .bind(post.budget().currency.as_str().to_string())
        .bind(visibility_str(post.visibility()))
        .bind(post.state().as_str())
        .bind(facet_value_ids)
        .bind(collection_ids)
        .bind(post.created_at())
        .bind(post.updated_at())
        .bind(post.published_at())
        .bind(post.closed_at())
        .bind(post.rejected_at())
        .bind(post.edited_at())
        .bind(post.deleted_at())
        .bind(post.version() as i64)
        .bind(data)
}

#[async_trait]
impl JobPostRepository for PostgresJobPostRepository {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_post_id = %id), err)]
    async fn find_one(&self, tenant_id: TenantId, id: JobPostId) -> Result<Option<JobPost>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT data FROM job_posts WHERE tenant_id = $1 AND id = $2 AND {LIVE}"
        ))
        .bind(*tenant_id.as_uuid())
        .bind(*id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_job_post", e))?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row
                    .try_get("data")
                    .map_err(|e| map_sqlx_error("find_job_post", e))?;
                decode_post(data).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, options), fields(tenant_id = %tenant_id), err)]
    async fn find_all(
        &self,
        tenant_id: TenantId,
        options: &JobPostListOptions,
    ) -> Result<PaginatedList<JobPost>, RepositoryError> {
        let total: i64 = Self::count_query(tenant_id, options)
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_job_posts", e))?;

        let rows: Vec<serde_json::Value> = Self::list_query(tenant_id, options)
            .build_query_scalar()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_job_posts", e))?;

        let items = rows
            .into_iter()
            .map(decode_post)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaginatedList {
            items,
            total_items: total.max(0) as usize,
        })
    }

    #[instrument(skip(self, post), fields(job_post_id = %post.id_typed(), version = post.version()), err)]
    async fn save(&self, post: &JobPost, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let data = serde_json::to_value(post).map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        match expected {
            ExpectedVersion::Exact(0) => {
                bind_post(sqlx::query(INSERT_SQL), post, data)
                    .execute(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("insert_job_post", e))?;
            }
            ExpectedVersion::Exact(version) => {
                let result = bind_post(sqlx::query(UPDATE_SQL), post, data)
                    .bind(version as i64)
                    .execute(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("update_job_post", e))?;
                if result.rows_affected() == 0 {
                    return Err(RepositoryError::Conflict(format!(
                        "job post {} is not at version {version}",
                        post.id_typed()
                    )));
                }
            }
            ExpectedVersion::Any => {
                let sql = format!("{INSERT_SQL}{UPSERT_SUFFIX}");
                bind_post(sqlx::query(&sql), post, data)
                    .execute(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("upsert_job_post", e))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresFacetValueRepository {
    pool: Arc<PgPool>,
}

impl PostgresFacetValueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FacetValueRow {
    id: Uuid,
    code: String,
    name: String,
    facet_id: Uuid,
    facet_code: String,
    facet_name: String,
    facet_is_private: bool,
}

impl From<FacetValueRow> for FacetValue {
    fn from(row: FacetValueRow) -> Self {
        FacetValue {
            id: FacetValueId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            facet: Facet {
                id: FacetId::from_uuid(row.facet_id),
                code: row.facet_code,
                name: row.facet_name,
                is_private: row.facet_is_private,
            },
        }
    }
}

#[async_trait]
impl FacetValueRepository for PostgresFacetValueRepository {
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[FacetValueId]) -> Result<Vec<FacetValue>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<FacetValueRow> = sqlx::query_as(
            r#"
            SELECT fv.id, fv.code, fv.name,
                   f.id AS facet_id, f.code AS facet_code, f.name AS facet_name,
                   f.is_private AS facet_is_private
            FROM facet_values fv
            JOIN facets f ON f.id = fv.facet_id AND f.tenant_id = fv.tenant_id
            WHERE fv.tenant_id = $1 AND fv.id = ANY($2)
            ORDER BY array_position($2, fv.id)
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_facet_values", e))?;

        Ok(rows.into_iter().map(FacetValue::from).collect())
    }

    async fn save(&self, tenant_id: TenantId, value: &FacetValue) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("save_facet_value", e))?;

        sqlx::query(
            r#"
            INSERT INTO facets (id, tenant_id, code, name, is_private)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code, name = EXCLUDED.name, is_private = EXCLUDED.is_private
            "#,
        )
        .bind(*value.facet.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(&value.facet.code)
        .bind(&value.facet.name)
        .bind(value.facet.is_private)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_facet", e))?;

        sqlx::query(
            r#"
            INSERT INTO facet_values (id, tenant_id, facet_id, code, name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                facet_id = EXCLUDED.facet_id, code = EXCLUDED.code, name = EXCLUDED.name
            "#,
        )
        .bind(*value.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(*value.facet.id.as_uuid())
        .bind(&value.code)
        .bind(&value.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_facet_value", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("save_facet_value", e))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresAssetRepository {
    pool: Arc<PgPool>,
}

impl PostgresAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    name: String,
    mime_type: String,
    source: String,
}

#[async_trait]
impl AssetRepository for PostgresAssetRepository {
    async fn find_by_ids(&self, tenant_id: TenantId, ids: &[AssetId]) -> Result<Vec<Asset>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<AssetRow> = sqlx::query_as(
            r#"
            SELECT id, name, mime_type, source
            FROM assets
            WHERE tenant_id = $1 AND id = ANY($2)
            ORDER BY array_position($2, id)
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_assets", e))?;

        Ok(rows
            .into_iter()
            .map(|r| Asset {
                id: AssetId::from_uuid(r.id),
                name: r.name,
                mime_type: r.mime_type,
                source: r.source,
            })
            .collect())
    }

    async fn save(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, tenant_id, name, mime_type, source)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, mime_type = EXCLUDED.mime_type, source = EXCLUDED.source
            "#,
        )
        .bind(*asset.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(&asset.name)
        .bind(&asset.mime_type)
        .bind(&asset.source)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_asset", e))?;
        Ok(())
    }
}
