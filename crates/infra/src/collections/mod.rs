//! Collections: facet-value rules that group job posts, and the buffered
//! `apply-collection-filters` job that keeps membership current.

pub mod buffer;
pub mod plugin;
pub mod repository;
pub mod service;

pub use buffer::{APPLY_COLLECTION_FILTERS_QUEUE, ApplyCollectionFiltersJobData, CollectionJobBuffer};
pub use plugin::CollectionPlugin;
pub use repository::{CollectionRepository, InMemoryCollectionRepository, PostgresCollectionRepository};
pub use service::{CollectionError, CollectionService};
