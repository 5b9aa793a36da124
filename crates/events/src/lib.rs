//! Domain events and the in-process event bus.
//!
//! Services publish an [`EventEnvelope`] after a successful write; plugins
//! (search indexing, notifications) subscribe and react. Delivery is
//! at-least-once and subscribers must be idempotent.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
