//! Catalog entities referenced by job posts: facets (skills, categories,
//! durations, ...) and uploaded assets.

use serde::{Deserialize, Serialize};

use firelancer_core::{AssetId, CollectionId, FacetId, FacetValueId};

/// A filter dimension, e.g. "Skill".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub id: FacetId,
    pub code: String,
    pub name: String,
    /// Private facets are hidden from shop-side responses.
    pub is_private: bool,
}

/// A value of a facet, hydrated with its facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub id: FacetValueId,
    pub code: String,
    pub name: String,
    pub facet: Facet,
}

impl FacetValue {
    /// Whether this value may be shown to shop-side callers.
    pub fn is_public(&self) -> bool {
        !self.facet.is_private
    }
}

/// An uploaded file attached to a job post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub mime_type: String,
    /// Storage location, e.g. an object-store key.
    pub source: String,
}

/// A curated grouping of job posts, populated by facet-value rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub slug: String,
    pub name: String,
    /// A post belongs to the collection when it carries every one of these.
    /// An empty filter matches nothing.
    pub filter_facet_value_ids: Vec<FacetValueId>,
}

impl Collection {
    pub fn matches(&self, facet_value_ids: &[FacetValueId]) -> bool {
        !self.filter_facet_value_ids.is_empty()
            && self
                .filter_facet_value_ids
                .iter()
                .all(|id| facet_value_ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_require_every_filter_value() {
        let (a, b, c) = (FacetValueId::new(), FacetValueId::new(), FacetValueId::new());
        let collection = Collection {
            id: CollectionId::new(),
            slug: "design".into(),
            name: "Design".into(),
            filter_facet_value_ids: vec![a, b],
        };

        assert!(collection.matches(&[c, b, a]));
        assert!(!collection.matches(&[a, c]));

        let empty = Collection {
            filter_facet_value_ids: Vec::new(),
            ..collection
        };
        assert!(!empty.matches(&[a, b]));
    }
}
