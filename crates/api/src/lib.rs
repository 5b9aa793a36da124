//! HTTP API: configuration, service wiring, routing and error mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
