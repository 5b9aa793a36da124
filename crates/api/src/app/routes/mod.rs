use axum::{Router, routing::get};

pub mod catalog;
pub mod job_posts;
pub mod job_queues;
pub mod search;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/job-posts", job_posts::router())
        .nest("/search", search::router())
        .nest("/catalog", catalog::router())
        .nest("/job-queues", job_queues::router())
}
