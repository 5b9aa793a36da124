use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};

use firelancer_auth::Permission;
use firelancer_core::RequestContext;
use firelancer_job_posts::FacetValue;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/collections", get(list_collections).put(save_collection))
        .route("/facet-values", put(save_facet_value))
}

pub async fn list_collections(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::READ_JOB_POST]) {
        return resp;
    }

    match services.collections.find_all(&ctx).await {
        Ok(collections) => Json(collections).into_response(),
        Err(e) => errors::collection_error_to_response(e),
    }
}

/// Save a collection and schedule re-evaluation of its members.
pub async fn save_collection(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::SaveCollectionRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::MANAGE_CATALOG]) {
        return resp;
    }

    let collection = body.into_collection();
    let id = collection.id;
    match services.collections.save(&ctx, collection).await {
        Ok(job) => Json(serde_json::json!({
            "id": id,
            "apply_filters_job": job.as_ref().map(dto::ScheduledJobResponse::from),
        }))
        .into_response(),
        Err(e) => errors::collection_error_to_response(e),
    }
}

pub async fn save_facet_value(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<FacetValue>,
) -> Response {
    if let Err(resp) = authz::require(&principal, &[Permission::MANAGE_CATALOG]) {
        return resp;
    }

    match services.facet_values.save(ctx.tenant_id(), &body).await {
        Ok(()) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => errors::job_post_error_to_response(e.into()),
    }
}
