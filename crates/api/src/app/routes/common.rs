use axum::http::StatusCode;
use axum::response::IntoResponse;

use ventora_auth::{CommandAuthorization, Permission};
use ventora_core::AggregateId;

use crate::app::errors;

/// Associates required permissions with a command for the authz guard.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path segment as an aggregate id, or produce the 400 response.
pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

/// Standard response for a dispatched command.
pub fn committed_response(
    status: StatusCode,
    id: AggregateId,
    committed: usize,
) -> axum::response::Response {
    (
        status,
        axum::Json(serde_json::json!({
            "id": id.to_string(),
            "events_committed": committed,
        })),
    )
        .into_response()
}
