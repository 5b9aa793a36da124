use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
};
use uuid::Uuid;

use firelancer_auth::Permission;
use firelancer_core::RequestContext;
use firelancer_infra::job_queue::SubscribableJob;
use firelancer_job_posts::JobPostId;
use firelancer_search::{SearchInput, SearchResult};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(search))
        .route("/profiles/:id", put(update_profile_index).delete(delete_profile_index))
        .route("/job-posts/:id/reindex", post(reindex_job_post))
}

/// Shop-side callers only see enabled rows.
pub async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(input): Json<SearchInput>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::SEARCH]) {
        return resp;
    }

    match services.search.search(&ctx, &input).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => errors::search_error_to_response(e),
    }
}

pub async fn update_profile_index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<dto::UpdateProfileIndexRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::UPDATE_SEARCH_INDEX]) {
        return resp;
    }

    let scheduled = services
        .indexer
        .update_profile(&ctx, id, body.title, body.description, body.enabled)
        .await;
    scheduled_response(scheduled)
}

pub async fn delete_profile_index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::UPDATE_SEARCH_INDEX]) {
        return resp;
    }

    scheduled_response(services.indexer.delete_profile(&ctx, id).await)
}

pub async fn reindex_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::UPDATE_SEARCH_INDEX]) {
        return resp;
    }
    let id: JobPostId = match id.parse() {
        Ok(id) => id,
        Err(_) => return errors::invalid_id("job post"),
    };

    scheduled_response(services.indexer.update_job_post(&ctx, id).await)
}

fn scheduled_response(scheduled: SearchResult<Option<SubscribableJob>>) -> Response {
    match scheduled {
        Ok(Some(job)) => (StatusCode::ACCEPTED, Json(dto::ScheduledJobResponse::from(&job))).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "queue_not_registered",
            "search index queue is not registered",
        ),
        Err(e) => errors::search_error_to_response(e),
    }
}
