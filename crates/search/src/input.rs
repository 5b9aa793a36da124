use serde::{Deserialize, Serialize};

use firelancer_core::{CollectionId, FacetValueId};

use crate::error::{SearchError, SearchResult};
use crate::types::SearchIndexName;

pub const DEFAULT_TAKE: usize = 25;
pub const MAX_TAKE: usize = 1000;

/// One facet-value constraint. Set exactly one of `and` / `or`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValueFilter {
    /// The value must be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<FacetValueId>,
    /// At least one of the values must be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<FacetValueId>>,
}

impl FacetValueFilter {
    pub fn and(id: FacetValueId) -> Self {
        Self { and: Some(id), or: None }
    }

    pub fn or(ids: Vec<FacetValueId>) -> Self {
        Self { and: None, or: Some(ids) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchSortField {
    Title,
    Budget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchSortOrder {
    #[default]
    Asc,
    Desc,
}

impl SearchSortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SearchSortOrder::Asc => "ASC",
            SearchSortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSort {
    pub field: SearchSortField,
    #[serde(default)]
    pub order: SearchSortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchInput {
    pub index: SearchIndexName,
    pub term: Option<String>,
    pub facet_value_filters: Vec<FacetValueFilter>,
    pub collection_id: Option<CollectionId>,
    pub collection_slug: Option<String>,
    pub skip: usize,
    pub take: Option<usize>,
    /// Defaults to relevance, best first.
    pub sort: Option<SearchSort>,
}

impl SearchInput {
    pub fn for_index(index: SearchIndexName) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn take(&self) -> usize {
        self.take.unwrap_or(DEFAULT_TAKE)
    }

    /// The trimmed term, if any.
    pub fn term(&self) -> Option<&str> {
        self.term.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Reject malformed input. Strategies call this before querying.
    pub fn validate(&self) -> SearchResult<()> {
        for filter in &self.facet_value_filters {
            if filter.and.is_some() && filter.or.is_some() {
                return Err(SearchError::user_input(
                    "a facetValueFilter cannot have both 'and' and 'or' set",
                ));
            }
        }
        if self.take() > MAX_TAKE {
            return Err(SearchError::user_input(format!("take must not exceed {MAX_TAKE}")));
        }
        if let Some(sort) = self.sort {
            if sort.field == SearchSortField::Budget && self.index != SearchIndexName::JobPost {
                return Err(SearchError::user_input(format!(
                    "index {} cannot be sorted by budget",
                    self.index
                )));
            }
        }
        Ok(())
    }
}

/// Whitespace-separated words of `term`, lowercased, keeping only
/// alphanumeric characters. Words left empty are dropped.
pub(crate) fn term_words(term: &str) -> Vec<String> {
    term.split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
