//! Postgres search over the `*_search_items` tables.
//!
//! List columns (`facet_value_ids`, `collection_ids`, ...) are comma-delimited
//! text and are matched with `string_to_array`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

use firelancer_core::{CollectionId, FacetValueId, RequestContext, TenantId};

use crate::error::{SearchResult, map_sqlx_error};
use crate::input::{SearchInput, SearchSortField, term_words};
use crate::strategy::{DEFAULT_MIN_TERM_LENGTH, DESCRIPTION_WEIGHT, SearchIndexStore, SearchStrategy, TITLE_WEIGHT};
use crate::types::{IndexFields, SearchHit, SearchIndexItem, SearchIndexName, join_list, parse_ids, split_list};

const COMMON_COLUMNS: &str =
    "id, tenant_id, title, description, enabled, facet_ids, facet_value_ids, collection_ids, collection_slugs";

const TEXT_VECTOR: &str = "(to_tsvector('simple', title) || to_tsvector('simple', description))";

/// How the term constrains and scores rows.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TermMatch {
    None,
    /// A `to_tsquery` expression.
    FullText(String),
    /// An `ILIKE` pattern.
    Substring(String),
}

#[derive(Debug, Clone)]
pub struct PostgresSearchStrategy {
    pool: Arc<PgPool>,
    min_term_length: usize,
}

impl PostgresSearchStrategy {
    pub fn new(pool: PgPool) -> Self {
        Self::with_min_term_length(pool, DEFAULT_MIN_TERM_LENGTH)
    }

    pub fn with_min_term_length(pool: PgPool, min_term_length: usize) -> Self {
        Self {
            pool: Arc::new(pool),
            min_term_length,
        }
    }

    fn term_match(&self, input: &SearchInput) -> TermMatch {
        let Some(term) = input.term() else {
            return TermMatch::None;
        };
        let words = term_words(term);
        if term.chars().count() > self.min_term_length && !words.is_empty() {
            let query = words
                .iter()
                .map(|w| format!("{w}:*"))
                .collect::<Vec<_>>()
                .join(" & ");
            TermMatch::FullText(query)
        } else {
            let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            TermMatch::Substring(format!("%{escaped}%"))
        }
    }

    fn push_score(qb: &mut QueryBuilder<'static, Postgres>, term: &TermMatch) {
        match term {
            TermMatch::None => {
                qb.push("0::float8 AS score");
            }
            TermMatch::FullText(query) => {
                qb.push("(ts_rank(to_tsvector('simple', title), to_tsquery('simple', ")
                    .push_bind(query.clone())
                    .push(format!(")) * {TITLE_WEIGHT} + ts_rank(to_tsvector('simple', description), to_tsquery('simple', "))
                    .push_bind(query.clone())
                    .push(format!(")) * {DESCRIPTION_WEIGHT})::float8 AS score"));
            }
            TermMatch::Substring(pattern) => {
                qb.push("((CASE WHEN title ILIKE ")
                    .push_bind(pattern.clone())
                    .push(format!(" THEN {TITLE_WEIGHT} ELSE 0 END) + (CASE WHEN description ILIKE "))
                    .push_bind(pattern.clone())
                    .push(format!(" THEN {DESCRIPTION_WEIGHT} ELSE 0 END))::float8 AS score"));
            }
        }
    }

    fn push_where(
        qb: &mut QueryBuilder<'static, Postgres>,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
        term: &TermMatch,
    ) {
        qb.push(" WHERE tenant_id = ").push_bind(*ctx.tenant_id().as_uuid());
        if enabled_only {
            qb.push(" AND enabled = TRUE");
        }

        match term {
            TermMatch::None => {}
            TermMatch::FullText(query) => {
                qb.push(format!(" AND {TEXT_VECTOR} @@ to_tsquery('simple', "))
                    .push_bind(query.clone())
                    .push(")");
            }
            TermMatch::Substring(pattern) => {
                qb.push(" AND (title ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR description ILIKE ")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        }

        for filter in &input.facet_value_filters {
            if let Some(id) = filter.and {
                qb.push(" AND ")
                    .push_bind(id.to_string())
                    .push(" = ANY(string_to_array(facet_value_ids, ','))");
            } else if let Some(ids) = &filter.or {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                qb.push(" AND string_to_array(facet_value_ids, ',') && ")
                    .push_bind(ids)
                    .push("::text[]");
            }
        }
        if let Some(id) = input.collection_id {
            qb.push(" AND ")
                .push_bind(id.to_string())
                .push(" = ANY(string_to_array(collection_ids, ','))");
        }
        if let Some(slug) = &input.collection_slug {
            qb.push(" AND ")
                .push_bind(slug.clone())
                .push(" = ANY(string_to_array(collection_slugs, ','))");
        }
    }

    /// Page query for `search` (exposed for SQL inspection).
    pub fn search_query(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> QueryBuilder<'static, Postgres> {
        let term = self.term_match(input);
        let mut qb = QueryBuilder::new(format!("SELECT {}, ", columns(input.index)));
        Self::push_score(&mut qb, &term);
        qb.push(format!(" FROM {}", input.index.table()));
        Self::push_where(&mut qb, ctx, input, enabled_only, &term);

        match input.sort {
            Some(sort) => {
                let column = match sort.field {
                    SearchSortField::Title => "title",
                    SearchSortField::Budget => "budget",
                };
                qb.push(format!(" ORDER BY {column} {}, id ASC", sort.order.as_sql()));
            }
            None => {
                qb.push(" ORDER BY score DESC, id ASC");
            }
        }
        qb.push(" LIMIT ")
            .push_bind(input.take() as i64)
            .push(" OFFSET ")
            .push_bind(input.skip as i64);
        qb
    }

    pub fn count_query(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> QueryBuilder<'static, Postgres> {
        let term = self.term_match(input);
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM (SELECT id FROM {}", input.index.table()));
        Self::push_where(&mut qb, ctx, input, enabled_only, &term);
        qb.push(") AS filtered");
        qb
    }

    /// `value -> count` over the ids in `column` of every matching row.
    pub fn list_counts_query(
        &self,
        column: &'static str,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> QueryBuilder<'static, Postgres> {
        let term = self.term_match(input);
        let mut qb = QueryBuilder::new(format!("SELECT value, COUNT(*) AS count FROM (SELECT {column} FROM {}", input.index.table()));
        Self::push_where(&mut qb, ctx, input, enabled_only, &term);
        qb.push(format!(
            ") AS filtered CROSS JOIN LATERAL unnest(string_to_array(filtered.{column}, ',')) AS value \
             WHERE value <> '' GROUP BY value"
        ));
        qb
    }

    async fn list_counts<T: FromStr + Eq + std::hash::Hash>(
        &self,
        column: &'static str,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<T, usize>> {
        input.validate()?;
        let rows: Vec<(String, i64)> = self
            .list_counts_query(column, ctx, input, enabled_only)
            .build_query_as()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_list_counts", e))?;

        let mut counts = HashMap::with_capacity(rows.len());
        for (value, count) in rows {
            match value.parse::<T>() {
                Ok(id) => {
                    counts.insert(id, count.max(0) as usize);
                }
                Err(_) => warn!(column, value = %value, "unparsable id in search index"),
            }
        }
        Ok(counts)
    }
}

fn columns(index: SearchIndexName) -> String {
    match index {
        SearchIndexName::JobPost => format!("{COMMON_COLUMNS}, currency_code, budget"),
        SearchIndexName::Profile => COMMON_COLUMNS.to_string(),
    }
}

fn item_from_row(index: SearchIndexName, row: &PgRow) -> Result<SearchIndexItem, sqlx::Error> {
    let fields = match index {
        SearchIndexName::JobPost => IndexFields::JobPost {
            currency_code: row.try_get("currency_code")?,
            budget: row.try_get("budget")?,
        },
        SearchIndexName::Profile => IndexFields::Profile,
    };
    let tenant_id: Uuid = row.try_get("tenant_id")?;
    let facet_ids: String = row.try_get("facet_ids")?;
    let facet_value_ids: String = row.try_get("facet_value_ids")?;
    let collection_ids: String = row.try_get("collection_ids")?;
    let collection_slugs: String = row.try_get("collection_slugs")?;

    Ok(SearchIndexItem {
        id: row.try_get("id")?,
        tenant_id: TenantId::from_uuid(tenant_id),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        enabled: row.try_get("enabled")?,
        facet_ids: parse_ids(&facet_ids),
        facet_value_ids: parse_ids(&facet_value_ids),
        collection_ids: parse_ids(&collection_ids),
        collection_slugs: split_list(&collection_slugs).map(str::to_string).collect(),
        fields,
    })
}

fn upsert_sql(index: SearchIndexName) -> String {
    let (extra_columns, extra_values, extra_updates) = match index {
        SearchIndexName::JobPost => (
            ", currency_code, budget",
            ", $10, $11",
            ", currency_code = EXCLUDED.currency_code, budget = EXCLUDED.budget",
        ),
        SearchIndexName::Profile => ("", "", ""),
    };
    format!(
        "INSERT INTO {table} ({COMMON_COLUMNS}{extra_columns}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9{extra_values}) \
         ON CONFLICT (tenant_id, id) DO UPDATE SET \
         title = EXCLUDED.title, description = EXCLUDED.description, enabled = EXCLUDED.enabled, \
         facet_ids = EXCLUDED.facet_ids, facet_value_ids = EXCLUDED.facet_value_ids, \
         collection_ids = EXCLUDED.collection_ids, collection_slugs = EXCLUDED.collection_slugs{extra_updates}",
        table = index.table()
    )
}

#[async_trait]
impl SearchStrategy for PostgresSearchStrategy {
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), index = %input.index), err)]
    async fn search(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<Vec<SearchHit>> {
        input.validate()?;
        let rows = self
            .search_query(ctx, input, enabled_only)
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search", e))?;

        rows.iter()
            .map(|row| {
                let item = item_from_row(input.index, row)?;
                let score: f64 = row.try_get("score")?;
                Ok(SearchHit { item, score })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_search_hit", e))
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), index = %input.index), err)]
    async fn get_total_count(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> SearchResult<usize> {
        input.validate()?;
        let total: i64 = self
            .count_query(ctx, input, enabled_only)
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_count", e))?;
        Ok(total.max(0) as usize)
    }

    async fn get_facet_value_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<FacetValueId, usize>> {
        self.list_counts("facet_value_ids", ctx, input, enabled_only).await
    }

    async fn get_collection_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<CollectionId, usize>> {
        self.list_counts("collection_ids", ctx, input, enabled_only).await
    }
}

#[async_trait]
impl SearchIndexStore for PostgresSearchStrategy {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, index = %index, id = %id), err)]
    async fn find(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<Option<SearchIndexItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE tenant_id = $1 AND id = $2",
            columns(index),
            index.table()
        ))
        .bind(*tenant_id.as_uuid())
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_search_item", e))?;

        row.map(|row| item_from_row(index, &row))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_search_item", e))
    }

    #[instrument(skip(self, item), fields(tenant_id = %item.tenant_id, index = %item.index(), id = %item.id), err)]
    async fn upsert(&self, item: &SearchIndexItem) -> SearchResult<()> {
        let sql = upsert_sql(item.index());
        let mut query = sqlx::query(&sql)
            .bind(item.id)
            .bind(*item.tenant_id.as_uuid())
            .bind(item.title.clone())
            .bind(item.description.clone())
            .bind(item.enabled)
            .bind(join_list(&item.facet_ids))
            .bind(join_list(&item.facet_value_ids))
            .bind(join_list(&item.collection_ids))
            .bind(item.collection_slugs.join(","));
        if let IndexFields::JobPost { currency_code, budget } = &item.fields {
            query = query.bind(currency_code.clone()).bind(*budget);
        }
        query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_search_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, index = %index, id = %id), err)]
    async fn delete(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE tenant_id = $1 AND id = $2", index.table()))
            .bind(*tenant_id.as_uuid())
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_search_item", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{FacetValueFilter, SearchSort, SearchSortOrder};

    fn strategy() -> PostgresSearchStrategy {
        // connect_lazy never touches the network; only SQL text is inspected.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/firelancer")
            .unwrap();
        PostgresSearchStrategy::new(pool)
    }

    fn ctx() -> RequestContext {
        RequestContext::system(TenantId::new())
    }

    #[tokio::test]
    async fn long_terms_use_weighted_full_text() {
        let input = SearchInput {
            term: Some("logo design".into()),
            ..Default::default()
        };
        let s = strategy();

        assert_eq!(
            s.term_match(&input),
            TermMatch::FullText("logo:* & design:*".into())
        );
        let qb = s.search_query(&ctx(), &input, true);
        assert_eq!(
            qb.sql(),
            "SELECT id, tenant_id, title, description, enabled, facet_ids, facet_value_ids, collection_ids, \
             collection_slugs, currency_code, budget, \
             (ts_rank(to_tsvector('simple', title), to_tsquery('simple', $1)) * 10 + \
             ts_rank(to_tsvector('simple', description), to_tsquery('simple', $2)) * 2)::float8 AS score \
             FROM job_post_search_items WHERE tenant_id = $3 AND enabled = TRUE \
             AND (to_tsvector('simple', title) || to_tsvector('simple', description)) @@ to_tsquery('simple', $4) \
             ORDER BY score DESC, id ASC LIMIT $5 OFFSET $6"
        );
    }

    #[tokio::test]
    async fn short_terms_fall_back_to_ilike() {
        let input = SearchInput {
            index: SearchIndexName::Profile,
            term: Some("ux".into()),
            ..Default::default()
        };
        let s = strategy();

        assert_eq!(s.term_match(&input), TermMatch::Substring("%ux%".into()));
        let sql = s.search_query(&ctx(), &input, false).sql().to_string();
        assert!(sql.contains("FROM profile_search_items WHERE tenant_id = $3 AND (title ILIKE $4 OR description ILIKE $5)"));
        assert!(!sql.contains("currency_code"));
        assert!(!sql.contains("enabled = TRUE"));
    }

    #[tokio::test]
    async fn ilike_patterns_escape_wildcards() {
        let input = SearchInput {
            term: Some("5%".into()),
            ..Default::default()
        };
        assert_eq!(strategy().term_match(&input), TermMatch::Substring("%5\\%%".into()));
    }

    #[tokio::test]
    async fn filters_and_explicit_sort_keep_the_id_tiebreak() {
        let input = SearchInput {
            facet_value_filters: vec![
                FacetValueFilter::and(FacetValueId::new()),
                FacetValueFilter::or(vec![FacetValueId::new(), FacetValueId::new()]),
            ],
            collection_slug: Some("design".into()),
            sort: Some(SearchSort {
                field: SearchSortField::Budget,
                order: SearchSortOrder::Desc,
            }),
            ..Default::default()
        };
        let sql = strategy().search_query(&ctx(), &input, true).sql().to_string();

        assert!(sql.contains(
            "AND $2 = ANY(string_to_array(facet_value_ids, ',')) \
             AND string_to_array(facet_value_ids, ',') && $3::text[] \
             AND $4 = ANY(string_to_array(collection_slugs, ','))"
        ));
        assert!(sql.ends_with("ORDER BY budget DESC, id ASC LIMIT $5 OFFSET $6"));
    }

    #[tokio::test]
    async fn count_wraps_the_filtered_query() {
        let input = SearchInput {
            skip: 50,
            take: Some(10),
            ..Default::default()
        };
        let sql = strategy().count_query(&ctx(), &input, true).sql().to_string();

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT id FROM job_post_search_items WHERE tenant_id = $1 AND enabled = TRUE) AS filtered"
        );
    }

    #[tokio::test]
    async fn facet_counts_unnest_the_delimited_column() {
        let sql = strategy()
            .list_counts_query("facet_value_ids", &ctx(), &SearchInput::default(), false)
            .sql()
            .to_string();

        assert!(sql.starts_with("SELECT value, COUNT(*) AS count FROM (SELECT facet_value_ids FROM job_post_search_items"));
        assert!(sql.ends_with("unnest(string_to_array(filtered.facet_value_ids, ',')) AS value WHERE value <> '' GROUP BY value"));
    }

    #[test]
    fn upserts_key_on_tenant_and_id() {
        let sql = upsert_sql(SearchIndexName::JobPost);
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"));
        assert!(sql.contains("ON CONFLICT (tenant_id, id) DO UPDATE"));

        let sql = upsert_sql(SearchIndexName::Profile);
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"));
        assert!(!sql.contains("budget"));
    }
}
