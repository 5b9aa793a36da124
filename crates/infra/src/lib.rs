//! Infrastructure layer: job queues and buffers, job-post persistence and
//! services, collections, configuration, plugins and background workers.

pub mod collections;
pub mod config;
pub mod db;
pub mod job_posts;
pub mod job_queue;
pub mod plugin;
pub mod workers;
