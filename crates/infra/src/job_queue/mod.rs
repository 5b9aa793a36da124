//! Asynchronous job queue system.
//!
//! - [`JobQueueService`] creates named [`JobQueue`]s and starts/stops them together
//! - a [`JobQueueStrategy`] persists jobs and runs them (polling over memory or Postgres)
//! - [`JobBuffer`]s intercept jobs and collapse them on flush

pub mod buffer;
pub mod error;
pub mod error_handler;
pub mod polling;
pub mod postgres;
pub mod queue;
pub mod service;
pub mod store;
pub mod strategy;
pub mod types;

pub use buffer::{
    InMemoryJobBufferStorage, JobBuffer, JobBufferService, JobBufferStorageStrategy,
    PostgresJobBufferStorage,
};
pub use error::JobQueueError;
pub use error_handler::{ErrorHandlerStrategy, ErrorHandlers, TracingErrorHandler};
pub use polling::{
    InMemoryJobQueueStrategy, PollingConfig, PollingJobQueueStrategy, PostgresJobQueueStrategy,
};
pub use postgres::PostgresJobStore;
pub use queue::{JobQueue, JobUpdateOptions, SubscribableJob};
pub use service::{JobQueueInfo, JobQueueService, JobQueueServiceConfig};
pub use store::{InMemoryJobStore, JobStore};
pub use strategy::{JobListOptions, JobQueueStrategy, ProcessFn, ProcessFuture, process_fn};
pub use types::{BackoffStrategy, Job, JobId, JobOptions, JobState, RetryPolicy};
