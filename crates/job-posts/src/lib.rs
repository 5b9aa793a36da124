//! Job-post domain module: the `JobPost` aggregate, its lifecycle states and
//! the configurable transition table that governs moderation.
//!
//! Pure domain code. Persistence, ownership lookups and event publishing live
//! in `firelancer-infra`.

pub mod catalog;
pub mod job_post;
pub mod process;

pub use catalog::{Asset, Collection, Facet, FacetValue};
pub use job_post::{
    AssignCollections, CreateJobPost, EditJobPost, JobPost, JobPostAction,
    JobPostCollectionsAssigned, JobPostCommand, JobPostCreated, JobPostEdited, JobPostEvent,
    JobPostId, JobPostPatch, JobPostTransitioned, TransitionJobPost, Visibility,
};
pub use process::{JobPostProcess, JobPostState};
