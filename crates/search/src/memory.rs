use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use firelancer_core::{CollectionId, FacetValueId, RequestContext, TenantId};

use crate::error::{SearchError, SearchResult};
use crate::input::{SearchInput, SearchSortField, SearchSortOrder, term_words};
use crate::strategy::{DEFAULT_MIN_TERM_LENGTH, DESCRIPTION_WEIGHT, SearchIndexStore, SearchStrategy, TITLE_WEIGHT};
use crate::types::{SearchHit, SearchIndexItem, SearchIndexName};

type Key = (TenantId, SearchIndexName, Uuid);

/// In-memory index for tests/dev. Mirrors the Postgres matching rules.
#[derive(Debug)]
pub struct InMemorySearchIndex {
    items: RwLock<HashMap<Key, SearchIndexItem>>,
    min_term_length: usize,
}

impl Default for InMemorySearchIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_TERM_LENGTH)
    }
}

impl InMemorySearchIndex {
    pub fn new(min_term_length: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            min_term_length,
        }
    }

    fn poisoned() -> SearchError {
        SearchError::Storage("search index lock poisoned".to_string())
    }

    /// Matching rows with scores, unsorted and unpaginated.
    fn matching(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> SearchResult<Vec<SearchHit>> {
        input.validate()?;
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items
            .values()
            .filter(|item| item.tenant_id == ctx.tenant_id() && item.index() == input.index)
            .filter(|item| !enabled_only || item.enabled)
            .filter(|item| passes_filters(item, input))
            .filter_map(|item| {
                let score = match input.term() {
                    Some(term) => score(item, term, self.min_term_length)?,
                    None => 0.0,
                };
                Some(SearchHit {
                    item: item.clone(),
                    score,
                })
            })
            .collect())
    }
}

fn passes_filters(item: &SearchIndexItem, input: &SearchInput) -> bool {
    let facets_ok = input.facet_value_filters.iter().all(|filter| {
        if let Some(id) = filter.and {
            return item.facet_value_ids.contains(&id);
        }
        match &filter.or {
            Some(ids) => ids.iter().any(|id| item.facet_value_ids.contains(id)),
            None => true,
        }
    });
    facets_ok
        && input
            .collection_id
            .is_none_or(|id| item.collection_ids.contains(&id))
        && input
            .collection_slug
            .as_ref()
            .is_none_or(|slug| item.collection_slugs.contains(slug))
}

/// Relevance of `item` for `term`, or `None` when it does not match.
///
/// Long terms require every word to prefix some token of the title or
/// description. Short terms, and terms with no usable words, are a
/// case-insensitive substring match.
fn score(item: &SearchIndexItem, term: &str, min_term_length: usize) -> Option<f64> {
    let title = item.title.to_lowercase();
    let description = item.description.to_lowercase();
    let words = term_words(term);

    if term.chars().count() > min_term_length && !words.is_empty() {
        let has = |text: &str, word: &str| text.split(|c: char| !c.is_alphanumeric()).any(|t| t.starts_with(word));
        let in_title = words.iter().filter(|w| has(&title, w)).count();
        let in_description = words.iter().filter(|w| has(&description, w)).count();
        if !words.iter().all(|w| has(&title, w) || has(&description, w)) {
            return None;
        }
        let n = words.len() as f64;
        Some(TITLE_WEIGHT * in_title as f64 / n + DESCRIPTION_WEIGHT * in_description as f64 / n)
    } else {
        let needle = term.to_lowercase();
        let in_title = title.contains(&needle);
        let in_description = description.contains(&needle);
        if !in_title && !in_description {
            return None;
        }
        Some(TITLE_WEIGHT * f64::from(u8::from(in_title)) + DESCRIPTION_WEIGHT * f64::from(u8::from(in_description)))
    }
}

fn compare(a: &SearchHit, b: &SearchHit, input: &SearchInput) -> Ordering {
    let primary = match input.sort {
        Some(sort) => {
            let ord = match sort.field {
                SearchSortField::Title => a.item.title.cmp(&b.item.title),
                SearchSortField::Budget => a.item.budget().cmp(&b.item.budget()),
            };
            match sort.order {
                SearchSortOrder::Asc => ord,
                SearchSortOrder::Desc => ord.reverse(),
            }
        }
        None => b.score.total_cmp(&a.score),
    };
    primary.then_with(|| a.item.id.cmp(&b.item.id))
}

#[async_trait]
impl SearchStrategy for InMemorySearchIndex {
    async fn search(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<Vec<SearchHit>> {
        let mut hits = self.matching(ctx, input, enabled_only)?;
        hits.sort_by(|a, b| compare(a, b, input));
        Ok(hits.into_iter().skip(input.skip).take(input.take()).collect())
    }

    async fn get_total_count(&self, ctx: &RequestContext, input: &SearchInput, enabled_only: bool) -> SearchResult<usize> {
        Ok(self.matching(ctx, input, enabled_only)?.len())
    }

    async fn get_facet_value_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<FacetValueId, usize>> {
        let mut counts = HashMap::new();
        for hit in self.matching(ctx, input, enabled_only)? {
            for id in hit.item.facet_value_ids {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn get_collection_ids(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
        enabled_only: bool,
    ) -> SearchResult<HashMap<CollectionId, usize>> {
        let mut counts = HashMap::new();
        for hit in self.matching(ctx, input, enabled_only)? {
            for id in hit.item.collection_ids {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SearchIndexStore for InMemorySearchIndex {
    async fn find(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<Option<SearchIndexItem>> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items.get(&(tenant_id, index, id)).cloned())
    }

    async fn upsert(&self, item: &SearchIndexItem) -> SearchResult<()> {
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        items.insert((item.tenant_id, item.index(), item.id), item.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, index: SearchIndexName, id: Uuid) -> SearchResult<bool> {
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        Ok(items.remove(&(tenant_id, index, id)).is_some())
    }
}
