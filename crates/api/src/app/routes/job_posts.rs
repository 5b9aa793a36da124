use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use firelancer_auth::Permission;
use firelancer_core::{DomainError, RequestContext};
use firelancer_infra::job_posts::{CreateJobPostInput, UpdateJobPostInput};
use firelancer_job_posts::{JobPostId, JobPostState};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job_post).get(list_job_posts))
        .route(
            "/:id",
            get(get_job_post).patch(update_job_post).delete(delete_job_post),
        )
        .route("/:id/publish", post(publish_job_post))
        .route("/:id/resubmit", post(resubmit_job_post))
        .route("/:id/close", post(close_job_post))
        .route("/:id/approve", post(approve_job_post))
        .route("/:id/reject", post(reject_job_post))
}

fn parse_id(id: &str) -> Result<JobPostId, Response> {
    id.parse().map_err(|_| errors::invalid_id("job post"))
}

pub async fn create_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateJobPostInput>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::CREATE_JOB_POST]) {
        return resp;
    }

    match services.job_posts.create(&ctx, body).await {
        Ok(detail) => (StatusCode::CREATED, Json(detail)).into_response(),
        Err(e) => errors::job_post_error_to_response(e),
    }
}

/// Customers only ever list their own posts; open posts are found through search.
pub async fn list_job_posts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListJobPostsQuery>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::READ_JOB_POST]) {
        return resp;
    }
    let relations = match query.relations() {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let mut options = match query.list_options() {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    if !ctx.is_admin() {
        match ctx.active_customer_id() {
            Some(customer_id) => options = options.restricted_to_customer(customer_id),
            None => return errors::domain_error_to_response(DomainError::Unauthorized),
        }
    }

    match services.job_posts.find_all(&ctx, &options, relations).await {
        Ok(page) => Json(serde_json::json!({
            "items": page.items,
            "total_items": page.total_items,
        }))
        .into_response(),
        Err(e) => errors::job_post_error_to_response(e),
    }
}

/// Customers see their own posts and open posts; anything else is not found.
pub async fn get_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::RelationsQuery>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::READ_JOB_POST]) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let relations = match query.relations() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.job_posts.find_one(&ctx, id, relations).await {
        Ok(Some(detail))
            if ctx.is_admin()
                || ctx.active_customer_id() == Some(detail.job_post.customer_id())
                || detail.job_post.state() == JobPostState::Open =>
        {
            Json(detail).into_response()
        }
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "job post not found"),
        Err(e) => errors::job_post_error_to_response(e),
    }
}

pub async fn update_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateJobPostInput>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::UPDATE_JOB_POST]) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.job_posts.update(&ctx, id, body).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => errors::job_post_error_to_response(e),
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Publish,
    Resubmit,
    Close,
    Delete,
    Approve,
    Reject,
}

impl Transition {
    fn permission(self) -> Permission {
        match self {
            Transition::Publish | Transition::Resubmit | Transition::Close => Permission::UPDATE_JOB_POST,
            Transition::Delete => Permission::DELETE_JOB_POST,
            Transition::Approve | Transition::Reject => Permission::MODERATE_JOB_POST,
        }
    }
}

async fn run_transition(
    services: &AppServices,
    ctx: &RequestContext,
    principal: &PrincipalContext,
    id: &str,
    transition: Transition,
) -> Response {
    if let Err(resp) = authz::require(principal, &[transition.permission()]) {
        return resp;
    }
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let posts = &services.job_posts;
    let result = match transition {
        Transition::Publish => posts.publish(ctx, id).await,
        Transition::Resubmit => posts.resubmit(ctx, id).await,
        Transition::Close => posts.close(ctx, id).await,
        Transition::Delete => posts.delete_draft(ctx, id).await,
        Transition::Approve => posts.approve(ctx, id).await,
        Transition::Reject => posts.reject(ctx, id).await,
    };
    match result {
        Ok(post) => Json(post).into_response(),
        Err(e) => errors::job_post_error_to_response(e),
    }
}

pub async fn publish_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Publish).await
}

pub async fn resubmit_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Resubmit).await
}

pub async fn close_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Close).await
}

/// Soft-deletes a draft.
pub async fn delete_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Delete).await
}

pub async fn approve_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Approve).await
}

pub async fn reject_job_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    run_transition(&services, &ctx, &principal, &id, Transition::Reject).await
}
