use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use firelancer_core::{CollectionId, FacetValueId, RequestContext};

use crate::error::SearchResult;
use crate::input::SearchInput;
use crate::strategy::SearchStrategy;
use crate::types::SearchHit;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValueCount {
    pub facet_value_id: FacetValueId,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCount {
    pub collection_id: CollectionId,
    pub count: usize,
}

/// A page of hits plus the "refine by" counts over every match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<SearchHit>,
    pub total_items: usize,
    pub facet_values: Vec<FacetValueCount>,
    pub collections: Vec<CollectionCount>,
}

pub struct SearchService {
    strategy: Arc<dyn SearchStrategy>,
}

impl SearchService {
    pub fn new(strategy: Arc<dyn SearchStrategy>) -> Self {
        Self { strategy }
    }

    /// Administrators also see disabled rows.
    pub async fn search(&self, ctx: &RequestContext, input: &SearchInput) -> SearchResult<SearchResponse> {
        input.validate()?;
        let enabled_only = !ctx.is_admin();

        let items = self.strategy.search(ctx, input, enabled_only).await?;
        let total_items = self.strategy.get_total_count(ctx, input, enabled_only).await?;

        let mut facet_values: Vec<FacetValueCount> = self
            .strategy
            .get_facet_value_ids(ctx, input, enabled_only)
            .await?
            .into_iter()
            .map(|(facet_value_id, count)| FacetValueCount { facet_value_id, count })
            .collect();
        facet_values.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.facet_value_id.as_uuid().cmp(b.facet_value_id.as_uuid()))
        });

        let mut collections: Vec<CollectionCount> = self
            .strategy
            .get_collection_ids(ctx, input, enabled_only)
            .await?
            .into_iter()
            .map(|(collection_id, count)| CollectionCount { collection_id, count })
            .collect();
        collections.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.collection_id.as_uuid().cmp(b.collection_id.as_uuid()))
        });

        debug!(
            tenant_id = %ctx.tenant_id(),
            index = %input.index,
            returned = items.len(),
            total_items,
            "search served"
        );
        Ok(SearchResponse {
            items,
            total_items,
            facet_values,
            collections,
        })
    }
}
