//! API-side permission guard.
//!
//! Runs at the route boundary before any service call. Ownership and
//! admin-only checks stay in the services.

use axum::response::Response;

use firelancer_auth::{AuthzError, Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Check every `required` permission for the current principal.
pub fn authorize_request(principal: &PrincipalContext, required: &[Permission]) -> Result<(), AuthzError> {
    for permission in required {
        authorize(principal.principal(), permission)?;
    }
    Ok(())
}

/// [`authorize_request`] with the rejection already rendered.
pub fn require(principal: &PrincipalContext, required: &[Permission]) -> Result<(), Response> {
    authorize_request(principal, required).map_err(errors::authz_error_to_response)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use firelancer_auth::{JwtClaims, Principal, PrincipalId, Role};
    use firelancer_core::{CustomerId, TenantId};

    use super::*;

    fn principal(roles: Vec<Role>) -> PrincipalContext {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles,
            customer_id: Some(CustomerId::new()),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        };
        PrincipalContext::new(Principal::from_claims(&claims))
    }

    #[test]
    fn customers_may_post_but_not_moderate() {
        let customer = principal(vec![Role::CUSTOMER]);
        assert!(authorize_request(&customer, &[Permission::CREATE_JOB_POST, Permission::SEARCH]).is_ok());
        assert_eq!(
            authorize_request(&customer, &[Permission::MODERATE_JOB_POST]),
            Err(AuthzError::Forbidden("job_post.moderate".into()))
        );
        assert!(authorize_request(&customer, &[Permission::MANAGE_JOB_QUEUES]).is_err());
    }

    #[test]
    fn administrators_hold_the_wildcard() {
        let admin = principal(vec![Role::ADMINISTRATOR]);
        assert!(
            authorize_request(
                &admin,
                &[Permission::MODERATE_JOB_POST, Permission::MANAGE_JOB_QUEUES, Permission::MANAGE_CATALOG]
            )
            .is_ok()
        );
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let guest = principal(vec![Role::new("guest")]);
        assert!(authorize_request(&guest, &[Permission::READ_JOB_POST]).is_err());
        assert!(authorize_request(&guest, &[]).is_ok());
    }
}
