use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use ventora_auth::JwtValidator;

use crate::app::{errors, services::AppServices};
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Validates the bearer token and installs tenant/principal extensions.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state
        .jwt
        .validate(token)
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles.clone()));

    Ok(next.run(req).await)
}

/// Blocks requests from tenants whose subscription has lapsed or whose
/// company was suspended. Admin routes skip this layer so a suspended
/// tenant can still be reinstated.
pub async fn tenant_gate(
    State(services): State<Arc<AppServices>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(tenant) = req.extensions().get::<TenantContext>().copied() else {
        return Err(errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing tenant context",
        ));
    };

    // Tenants with no registered company (dev and test setups) pass through.
    if let Some(company) = services.company_for_tenant(tenant.tenant_id()) {
        if !company.is_operational(Utc::now()) {
            return Err(errors::json_error(
                StatusCode::PAYMENT_REQUIRED,
                "subscription_lapsed",
                "company is suspended or its subscription has lapsed",
            ));
        }
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
