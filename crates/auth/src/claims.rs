use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use firelancer_core::{CustomerId, DomainError, RequestContext, TenantId, UserId};

use crate::{PrincipalId, Role};

/// JWT claims model (transport-agnostic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    pub tenant_id: TenantId,

    pub roles: Vec<Role>,

    /// Set for shop-side tokens; the customer the principal acts as.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn is_administrator(&self) -> bool {
        self.roles.iter().any(Role::is_administrator)
    }

    /// Request context for the principal behind the token.
    ///
    /// Administrators act as themselves; everyone else must carry a customer id.
    pub fn request_context(&self) -> Result<RequestContext, DomainError> {
        if self.is_administrator() {
            return Ok(RequestContext::administrator(
                self.tenant_id,
                UserId::from_uuid(*self.sub.as_uuid()),
            ));
        }
        self.customer_id
            .map(|customer_id| RequestContext::customer(self.tenant_id, customer_id))
            .ok_or(DomainError::Unauthorized)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unsigned token: {0}")]
    Malformed(String),
}

/// Deterministically validate the claim time window.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
