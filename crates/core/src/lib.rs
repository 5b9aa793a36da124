//! `firelancer-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, the per-request context and a few
//! value objects shared by every marketplace module.

pub mod aggregate;
pub mod context;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use context::{Actor, RequestContext};
pub use error::{DomainError, DomainResult};
pub use id::{
    AggregateId, AssetId, CollectionId, CustomerId, FacetId, FacetValueId, TenantId, UserId,
};
pub use value_object::{CurrencyCode, Money, ValueObject};
