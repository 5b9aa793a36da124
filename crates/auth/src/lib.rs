//! `firelancer-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API decodes a bearer token into
//! [`JwtClaims`], resolves a [`Principal`] and checks permissions before any
//! service runs.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
