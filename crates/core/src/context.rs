//! Per-request context threaded through every service call.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{CustomerId, TenantId, UserId};

/// The authenticated party behind a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Background work (job queue processes, bootstrap tasks).
    System,
    /// A shop-side customer.
    Customer(CustomerId),
    /// An admin-side user.
    Administrator(UserId),
}

/// Ambient request data: tenant, actor and locale.
///
/// Constructed at the API boundary (or by a job worker) and passed by
/// reference into services. Cheap to clone so it can travel inside job
/// payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    tenant_id: TenantId,
    actor: Actor,
    language_code: String,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, actor: Actor) -> Self {
        Self {
            tenant_id,
            actor,
            language_code: "en".to_string(),
        }
    }

    pub fn system(tenant_id: TenantId) -> Self {
        Self::new(tenant_id, Actor::System)
    }

    pub fn customer(tenant_id: TenantId, customer_id: CustomerId) -> Self {
        Self::new(tenant_id, Actor::Customer(customer_id))
    }

    pub fn administrator(tenant_id: TenantId, user_id: UserId) -> Self {
        Self::new(tenant_id, Actor::Administrator(user_id))
    }

    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = language_code.into();
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn active_customer_id(&self) -> Option<CustomerId> {
        match self.actor {
            Actor::Customer(id) => Some(id),
            _ => None,
        }
    }

    /// The active customer, or `Forbidden` for any other actor.
    pub fn require_customer(&self) -> DomainResult<CustomerId> {
        self.active_customer_id().ok_or(DomainError::Forbidden)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.actor, Actor::Administrator(_) | Actor::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_customers_pass_require_customer() {
        let tenant = TenantId::new();
        let customer = CustomerId::new();

        let ctx = RequestContext::customer(tenant, customer);
        assert_eq!(ctx.require_customer(), Ok(customer));

        let admin = RequestContext::administrator(tenant, UserId::new());
        assert_eq!(admin.require_customer(), Err(DomainError::Forbidden));
        assert!(admin.is_admin());
    }

    #[test]
    fn context_survives_json_round_trip_for_job_payloads() {
        let ctx = RequestContext::customer(TenantId::new(), CustomerId::new()).with_language("de");
        let json = serde_json::to_value(&ctx).unwrap();
        let back: RequestContext = serde_json::from_value(json).unwrap();
        assert_eq!(ctx, back);
    }
}
