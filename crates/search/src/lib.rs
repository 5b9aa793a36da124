//! `firelancer-search`: denormalized search over job posts and profiles.
//!
//! - [`SearchStrategy`] answers [`SearchInput`] queries (Postgres or in-memory)
//! - index writers keep one [`SearchIndexItem`] per source entity
//! - [`SearchPlugin`] feeds job-post events through the `update-search-index`
//!   queue, optionally collapsed by [`SearchIndexJobBuffer`]

pub mod buffer;
pub mod db;
pub mod error;
pub mod input;
pub mod memory;
pub mod plugin;
pub mod postgres;
pub mod service;
pub mod strategy;
pub mod types;
pub mod writers;

pub use buffer::{SearchIndexJobBuffer, UPDATE_SEARCH_INDEX_QUEUE, UpdateSearchIndexJobData};
pub use error::{SearchError, SearchResult};
pub use input::{FacetValueFilter, SearchInput, SearchSort, SearchSortField, SearchSortOrder};
pub use memory::InMemorySearchIndex;
pub use plugin::{SearchIndexer, SearchPlugin};
pub use postgres::PostgresSearchStrategy;
pub use service::{CollectionCount, FacetValueCount, SearchResponse, SearchService};
pub use strategy::{SearchIndexStore, SearchStrategy};
pub use types::{IndexFields, SearchHit, SearchIndexItem, SearchIndexName};
pub use writers::{IndexOutcome, JobPostSearchService, ProfileSearchService};
