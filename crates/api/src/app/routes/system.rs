use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use firelancer_core::RequestContext;

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(ctx): Extension<RequestContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": principal.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "customer_id": ctx.active_customer_id().map(|c| c.to_string()),
        "is_admin": ctx.is_admin(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal.permissions().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
    }))
}
