//! Read and write seams of the search index.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use firelancer_core::{CollectionId, FacetValueId, RequestContext, TenantId};

use crate::error::SearchResult;
use crate::input::SearchInput;
use crate::types::{SearchHit, SearchIndexItem, SearchIndexName};

/// Title matches outweigh description matches.
pub const TITLE_WEIGHT: f64 = 10.0;
pub const DESCRIPTION_WEIGHT: f64 = 2.0;

/// Terms longer than this use full-text matching.
pub const DEFAULT_MIN_TERM_LENGTH: usize = 2;

/// Queries the index. Every call validates `input` first, and with
/// `enabled_only` skips disabled rows.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    async fn search(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<Vec<SearchHit>>;

    /// Matching rows, ignoring `skip` and `take`.
    async fn get_total_count(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> SearchResult<usize>;

    /// Facet value id -> number of matching rows carrying it.
    async fn get_facet_value_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<FacetValueId, usize>>;

    /// Collection id -> number of matching rows in it.
    async fn get_collection_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<CollectionId, usize>>;
}

/// Row-level writes used by the index writers.
#[async_trait]
pub trait SearchIndexStore: Send + Sync {
    async fn find(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<Option<SearchIndexItem>>;

    /// Insert, or replace the row with the same index and id.
    async fn upsert(&self, item: &SearchIndexItem) -> SearchResult<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<bool>;
}
