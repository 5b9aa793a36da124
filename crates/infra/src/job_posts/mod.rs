//! Job-post application layer: repositories (memory + Postgres) and the
//! service enforcing ownership, moderation and soft-delete.

pub mod filter;
pub mod postgres;
pub mod repository;
pub mod service;

pub use filter::{JobPostFilter, JobPostListOptions, JobPostSort, PaginatedList, SortField, SortOrder};
pub use postgres::{PostgresAssetRepository, PostgresFacetValueRepository, PostgresJobPostRepository};
pub use repository::{
    AssetRepository, FacetValueRepository, InMemoryAssetRepository, InMemoryFacetValueRepository,
    InMemoryJobPostRepository, JobPostRepository, RepositoryError,
};
pub use service::{
    CreateJobPostInput, JOB_POST_AGGREGATE, JobPostDetail, JobPostEventBus, JobPostService,
    JobPostServiceError, JobPostServiceResult, Relations, UpdateJobPostInput,
};
