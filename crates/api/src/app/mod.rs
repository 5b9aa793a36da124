//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter selection, services, plugins and job queues
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use firelancer_infra::config::FirelancerConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// The router together with the services behind it.
pub struct App {
    router: Router,
    services: Arc<AppServices>,
}

impl App {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn services(&self) -> &Arc<AppServices> {
        &self.services
    }

    /// Stop job queues and background workers.
    pub async fn shutdown(&self) {
        self.services.shutdown().await;
    }
}

/// Build services and the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: FirelancerConfig) -> anyhow::Result<App> {
    let jwt = Arc::new(firelancer_auth::Hs256JwtValidator::new(config.api.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services(config).await?);

    // Protected routes: require a valid token and a resolvable request context.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            services.error_handlers().clone(),
            middleware::report_server_errors,
        )));

    Ok(App { router, services })
}
