//! JWT verification (HS256).
//!
//! Decoding and signature checks live here; the claim-window policy is in
//! [`crate::claims`] so it stays pure and testable with an explicit clock.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use ventora_core::TenantId;

use crate::{JwtClaims, PrincipalId, Role, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature failure, bad encoding, or unusable claim values.
    #[error("malformed or unverifiable token")]
    Invalid,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Claims as they appear on the wire (RFC 7519 numeric dates).
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: Uuid,
    tenant_id: Uuid,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync + 'static {
    fn validate(&self, token: &str) -> Result<JwtClaims, TokenError>;
}

/// HS256 validator with a shared secret (from `JWT_SECRET`).
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time-window checks are ours (validate_claims), with zero leeway.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str) -> Result<JwtClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.key, &self.validation)
            .map_err(|_| TokenError::Invalid)?;
        let claims = from_wire(data.claims)?;
        validate_claims(&claims, Utc::now())?;
        Ok(claims)
    }
}

fn from_wire(wire: WireClaims) -> Result<JwtClaims, TokenError> {
    let issued_at = DateTime::from_timestamp(wire.iat, 0).ok_or(TokenError::Invalid)?;
    let expires_at = DateTime::from_timestamp(wire.exp, 0).ok_or(TokenError::Invalid)?;
    Ok(JwtClaims {
        sub: PrincipalId::from_uuid(wire.sub),
        tenant_id: TenantId::from_uuid(wire.tenant_id),
        roles: wire.roles.into_iter().map(Role::new).collect(),
        issued_at,
        expires_at,
    })
}

/// Mint an HS256 token for the given claims.
///
/// Used by dev tooling and test setups; production tokens come from the
/// identity provider.
pub fn issue_hs256(secret: &[u8], claims: &JwtClaims) -> Result<String, TokenError> {
    let wire = WireClaims {
        sub: *claims.sub.as_uuid(),
        tenant_id: *claims.tenant_id.as_uuid(),
        roles: claims.roles.iter().map(|r| r.as_str().to_string()).collect(),
        iat: claims.issued_at.timestamp(),
        exp: claims.expires_at.timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &wire,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fresh_claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::manager()],
            // Truncate to whole seconds so the wire round trip is exact.
            issued_at: DateTime::from_timestamp(now.timestamp() - 60, 0).unwrap(),
            expires_at: DateTime::from_timestamp(now.timestamp() + 3600, 0).unwrap(),
        }
    }

    #[test]
    fn issued_token_validates_with_same_secret() {
        let claims = fresh_claims();
        let token = issue_hs256(b"sekrit", &claims).unwrap();

        let validator = Hs256JwtValidator::new(b"sekrit");
        let decoded = validator.validate(&token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_hs256(b"sekrit", &fresh_claims()).unwrap();

        let validator = Hs256JwtValidator::new(b"other");
        assert!(matches!(
            validator.validate(&token),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = fresh_claims();
        claims.issued_at = claims.issued_at - Duration::hours(3);
        claims.expires_at = claims.expires_at - Duration::hours(3);
        let token = issue_hs256(b"sekrit", &claims).unwrap();

        let validator = Hs256JwtValidator::new(b"sekrit");
        assert!(matches!(
            validator.validate(&token),
            Err(TokenError::Claims(TokenValidationError::Expired))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let validator = Hs256JwtValidator::new(b"sekrit");
        assert!(matches!(
            validator.validate("not.a.jwt"),
            Err(TokenError::Invalid)
        ));
    }
}
