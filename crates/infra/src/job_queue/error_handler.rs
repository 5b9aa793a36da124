//! Side-channel error reporting for workers and the server.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use super::types::Job;

/// Receives errors for monitoring. Reports are fire-and-forget: a handler
/// must never change the outcome of the job or request that failed.
#[async_trait]
pub trait ErrorHandlerStrategy: Send + Sync {
    async fn handle_worker_error(&self, error: &str, job: &Job);

    async fn handle_server_error(&self, error: &str, host: &str);
}

/// Logs every reported error through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHandler;

#[async_trait]
impl ErrorHandlerStrategy for TracingErrorHandler {
    async fn handle_worker_error(&self, error: &str, job: &Job) {
        error!(
            queue = %job.queue_name,
            job_id = ?job.id,
            attempt = job.attempts,
            error,
            "worker error"
        );
    }

    async fn handle_server_error(&self, error: &str, host: &str) {
        error!(host, error, "server error");
    }
}

/// The registered handlers.
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    handlers: Arc<Vec<Arc<dyn ErrorHandlerStrategy>>>,
}

impl std::fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlers")
            .field("count", &self.handlers.len())
            .finish()
    }
}

impl ErrorHandlers {
    pub fn new(handlers: Vec<Arc<dyn ErrorHandlerStrategy>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Report to every handler without waiting for them.
    pub fn report_worker_error(&self, error: &str, job: &Job) {
        for handler in self.handlers.iter().cloned() {
            let error = error.to_string();
            let job = job.clone();
            tokio::spawn(async move { handler.handle_worker_error(&error, &job).await });
        }
    }

    /// Report to every handler without waiting for them.
    pub fn report_server_error(&self, error: &str, host: &str) {
        for handler in self.handlers.iter().cloned() {
            let error = error.to_string();
            let host = host.to_string();
            tokio::spawn(async move { handler.handle_server_error(&error, &host).await });
        }
    }
}
