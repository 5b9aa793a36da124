//! Job queue administration: queue status, buffers, job inspection.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use uuid::Uuid;

use firelancer_auth::Permission;
use firelancer_infra::job_queue::{JobId, JobQueueError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_queues))
        .route("/buffers", get(buffer_sizes))
        .route("/buffers/flush", post(flush_buffers))
        .route("/jobs", get(list_jobs))
        .route("/jobs/remove-settled", post(remove_settled_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}

fn require_queue_admin(principal: &PrincipalContext) -> Result<(), Response> {
    authz::require(principal, &[Permission::MANAGE_JOB_QUEUES])
}

pub async fn list_queues(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }

    match services.job_queue.get_job_queues() {
        Ok(queues) => Json(queues).into_response(),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

/// Buffered job counts of every active buffer.
pub async fn buffer_sizes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }

    match services.job_queue.buffer_size(&[]).await {
        Ok(sizes) => Json(sizes).into_response(),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

/// Drain, reduce and submit the named buffers (all active ones when empty).
pub async fn flush_buffers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::BufferIdsRequest>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }

    match services.job_queue.flush(&body.buffer_ids).await {
        Ok(submitted) => Json(submitted).into_response(),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListJobsQuery>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }
    let options = match query.list_options() {
        Ok(o) => o,
        Err(resp) => return resp,
    };

    match services.job_queue.strategy().find_jobs(&options).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }
    let id = JobId::from_uuid(id);

    match services.job_queue.strategy().find_one(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::job_queue_error_to_response(JobQueueError::JobNotFound(id)),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

/// Cancelling a settled job leaves it as it is.
pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }
    let id = JobId::from_uuid(id);

    match services.job_queue.strategy().cancel_job(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::job_queue_error_to_response(JobQueueError::JobNotFound(id)),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}

pub async fn remove_settled_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RemoveSettledJobsRequest>,
) -> Response {
    if let Err(resp) = require_queue_admin(&principal) {
        return resp;
    }

    match services
        .job_queue
        .strategy()
        .remove_settled_jobs(&body.queue_names, body.older_than)
        .await
    {
        Ok(removed) => (StatusCode::OK, Json(serde_json::json!({ "removed": removed }))).into_response(),
        Err(e) => errors::job_queue_error_to_response(e),
    }
}
