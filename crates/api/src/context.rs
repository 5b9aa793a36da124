use firelancer_auth::{Permission, Principal, PrincipalId, Role};
use firelancer_core::TenantId;

/// Authenticated principal for a request, with the permissions its roles
/// resolve to.
///
/// Inserted by the auth middleware next to the request's
/// [`firelancer_core::RequestContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.principal.active_tenant_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.membership.roles
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.principal.membership.permissions
    }
}
