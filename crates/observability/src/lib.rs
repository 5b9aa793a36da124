//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use tracing::{LogFormat, TracingConfig};

/// Initialize tracing from the environment.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&TracingConfig::from_env());
}
