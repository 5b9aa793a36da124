use std::collections::HashSet;

use thiserror::Error;

use firelancer_core::TenantId;

use crate::{JwtClaims, Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Resolve membership permissions from the roles carried by the token.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &claims.roles {
            for perm in role.permissions() {
                if !permissions.contains(&perm) {
                    permissions.push(perm);
                }
            }
        }

        Self {
            principal_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership {
                tenant_id: claims.tenant_id,
                roles: claims.roles.clone(),
                permissions,
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (ownership is checked by the services)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::Role;

    fn principal_with(roles: Vec<Role>) -> Principal {
        let now = Utc::now();
        Principal::from_claims(&JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles,
            customer_id: None,
            issued_at: now,
            expires_at: now,
        })
    }

    #[test]
    fn customers_cannot_moderate() {
        let customer = principal_with(vec![Role::CUSTOMER]);
        assert!(authorize(&customer, &Permission::CREATE_JOB_POST).is_ok());
        assert_eq!(
            authorize(&customer, &Permission::MODERATE_JOB_POST),
            Err(AuthzError::Forbidden("job_post.moderate".into()))
        );
    }

    #[test]
    fn administrators_hold_the_wildcard() {
        let admin = principal_with(vec![Role::ADMINISTRATOR]);
        assert!(authorize(&admin, &Permission::MANAGE_JOB_QUEUES).is_ok());
    }

    #[test]
    fn tenant_mismatch_is_rejected_first() {
        let mut admin = principal_with(vec![Role::ADMINISTRATOR]);
        admin.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&admin, &Permission::READ_JOB_POST),
            Err(AuthzError::TenantMismatch)
        );
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let nobody = principal_with(vec![Role::new("auditor")]);
        assert!(nobody.membership.permissions.is_empty());
    }
}
