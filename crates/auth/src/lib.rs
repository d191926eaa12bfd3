//! `ventora-auth` — authentication/authorization boundary.
//!
//! Pure policy checks plus JWT verification. This crate is intentionally
//! decoupled from HTTP and storage; the API layer wires it to requests.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError, issue_hs256};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::{Role, builtin_roles, role_permissions};
pub use user::{User, UserCommand, UserEvent};
