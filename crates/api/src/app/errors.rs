use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use firelancer_auth::AuthzError;
use firelancer_core::DomainError;
use firelancer_infra::collections::CollectionError;
use firelancer_infra::job_posts::JobPostServiceError;
use firelancer_infra::job_queue::JobQueueError;
use firelancer_search::SearchError;

/// Detail of a 5xx response, picked up by the server-error reporting layer.
#[derive(Debug, Clone)]
pub struct ServerError(pub String);

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    let message = message.into();
    let mut response = (
        status,
        axum::Json(json!({
            "error": code,
            "message": message,
        })),
    )
        .into_response();
    if status.is_server_error() {
        response.extensions_mut().insert(ServerError(message));
    }
    response
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::EntityNotFound { .. } => json_error(StatusCode::NOT_FOUND, "entity_not_found", message),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        DomainError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
        DomainError::UserInput(_) => json_error(StatusCode::BAD_REQUEST, "user_input_error", message),
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_transition", message)
        }
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
    }
}

pub fn job_post_error_to_response(err: JobPostServiceError) -> Response {
    match err {
        JobPostServiceError::Domain(e) => domain_error_to_response(e),
        JobPostServiceError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg),
        JobPostServiceError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn search_error_to_response(err: SearchError) -> Response {
    match err {
        SearchError::UserInput(msg) => json_error(StatusCode::BAD_REQUEST, "user_input_error", msg),
        SearchError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg),
    }
}

pub fn job_queue_error_to_response(err: JobQueueError) -> Response {
    let message = err.to_string();
    match err {
        JobQueueError::JobNotFound(_) => json_error(StatusCode::NOT_FOUND, "job_not_found", message),
        JobQueueError::QueueNotFound(_) => json_error(StatusCode::NOT_FOUND, "queue_not_found", message),
        JobQueueError::QueueAlreadyExists(_)
        | JobQueueError::AlreadyStarted(_)
        | JobQueueError::BufferAlreadyRegistered(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        JobQueueError::Timeout { .. } => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
        JobQueueError::NotPersisted => json_error(StatusCode::CONFLICT, "not_persisted", message),
        JobQueueError::JobFailed { .. } | JobQueueError::Storage(_) | JobQueueError::Serialization(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "job_queue_error", message)
        }
    }
}

pub fn collection_error_to_response(err: CollectionError) -> Response {
    match err {
        CollectionError::JobPost(e) => job_post_error_to_response(e),
        CollectionError::Repository(e) => job_post_error_to_response(e.into()),
        CollectionError::Queue(e) => job_queue_error_to_response(e),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn invalid_id(what: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}
