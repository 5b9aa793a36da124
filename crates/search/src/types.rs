//! Denormalized search-index rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use firelancer_core::{CollectionId, FacetId, FacetValueId, TenantId};

use crate::error::SearchError;

/// Which index a row or a search belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchIndexName {
    #[default]
    JobPost,
    Profile,
}

impl SearchIndexName {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchIndexName::JobPost => "JOB_POST",
            SearchIndexName::Profile => "PROFILE",
        }
    }

    /// Backing table of this index.
    pub fn table(self) -> &'static str {
        match self {
            SearchIndexName::JobPost => "job_post_search_items",
            SearchIndexName::Profile => "profile_search_items",
        }
    }
}

impl fmt::Display for SearchIndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchIndexName {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "JOB_POST" | "JOBPOST" => Ok(SearchIndexName::JobPost),
            "PROFILE" => Ok(SearchIndexName::Profile),
            other => Err(SearchError::user_input(format!("unknown search index '{other}'"))),
        }
    }
}

/// Index-specific columns, discriminated by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "index", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexFields {
    JobPost { currency_code: String, budget: i64 },
    Profile,
}

impl IndexFields {
    pub fn index(&self) -> SearchIndexName {
        match self {
            IndexFields::JobPost { .. } => SearchIndexName::JobPost,
            IndexFields::Profile => SearchIndexName::Profile,
        }
    }
}

/// One row per source entity per index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexItem {
    /// Id of the source entity.
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub enabled: bool,
    pub facet_ids: Vec<FacetId>,
    pub facet_value_ids: Vec<FacetValueId>,
    pub collection_ids: Vec<CollectionId>,
    pub collection_slugs: Vec<String>,
    #[serde(flatten)]
    pub fields: IndexFields,
}

impl SearchIndexItem {
    /// A fresh row with no facets or collections.
    pub fn new(
        id: Uuid,
        tenant_id: TenantId,
        title: impl Into<String>,
        description: impl Into<String>,
        enabled: bool,
        fields: IndexFields,
    ) -> Self {
        Self {
            id,
            tenant_id,
            title: title.into(),
            description: description.into(),
            enabled,
            facet_ids: Vec::new(),
            facet_value_ids: Vec::new(),
            collection_ids: Vec::new(),
            collection_slugs: Vec::new(),
            fields,
        }
    }

    pub fn index(&self) -> SearchIndexName {
        self.fields.index()
    }

    pub fn budget(&self) -> Option<i64> {
        match self.fields {
            IndexFields::JobPost { budget, .. } => Some(budget),
            IndexFields::Profile => None,
        }
    }
}

/// A matching row with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub item: SearchIndexItem,
    pub score: f64,
}

pub(crate) const LIST_DELIMITER: char = ',';

/// Join values into a delimited column value.
pub(crate) fn join_list<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a delimited column value. Empty segments are dropped.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(LIST_DELIMITER).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn parse_ids<T: FromStr>(value: &str) -> Vec<T> {
    split_list(value).filter_map(|s| s.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_lists_skip_empty_segments() {
        let a = FacetValueId::new();
        let b = FacetValueId::new();
        let joined = join_list(&[a, b]);

        assert_eq!(parse_ids::<FacetValueId>(&joined), vec![a, b]);
        assert!(parse_ids::<FacetValueId>("").is_empty());
        assert_eq!(split_list("x,,y,").collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn index_names_parse_loosely() {
        assert_eq!("job-post".parse::<SearchIndexName>().unwrap(), SearchIndexName::JobPost);
        assert_eq!("PROFILE".parse::<SearchIndexName>().unwrap(), SearchIndexName::Profile);
        assert!(matches!("orders".parse::<SearchIndexName>(), Err(SearchError::UserInput(_))));
    }

    #[test]
    fn items_serialize_with_their_index_tag() {
        let item = SearchIndexItem::new(
            Uuid::now_v7(),
            TenantId::new(),
            "Logo",
            "Vector logo",
            true,
            IndexFields::JobPost {
                currency_code: "USD".into(),
                budget: 100,
            },
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["index"], "JOB_POST");
        assert_eq!(json["budget"], 100);
        assert_eq!(serde_json::from_value::<SearchIndexItem>(json).unwrap(), item);
    }
}
