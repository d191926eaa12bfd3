use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use ventora_auth::Permission;
use ventora_cashbox::session::{CloseSession, OpenSession, RecordMovement};
use ventora_cashbox::{CashSession, CashSessionCommand, CashSessionId};
use ventora_core::{AggregateId, DocumentKind, UserId};
use ventora_inventory::StoreId;

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "cashbox.session";

pub fn router() -> Router {
    Router::new()
        .route("/sessions", post(open_session).get(list_sessions))
        .route("/sessions/open", get(open_session_for_store))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/movements", post(record_movement))
        .route("/sessions/:id/close", post(close_session))
}

fn dispatch_session(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: CashSessionCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("cashbox.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<CashSession>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| CashSession::empty(CashSessionId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Open a register session. The caller becomes the session's cashier.
pub async fn open_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenSessionRequest>,
) -> Response {
    let agg = AggregateId::new();
    let store = match parse_id(&body.store_id, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };

    let cmd = CashSessionCommand::Open(OpenSession {
        tenant_id: tenant.tenant_id(),
        session_id: CashSessionId::new(agg),
        store_id: store,
        cashier_id: UserId::from_uuid(*principal.principal_id().as_uuid()),
        opening_balance: body.opening_balance,
        occurred_at: Utc::now(),
    });

    dispatch_session(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> Response {
    let agg = match parse_id(&id, "session") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::CashMovement) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = CashSessionCommand::RecordMovement(RecordMovement {
        tenant_id: tenant.tenant_id(),
        session_id: CashSessionId::new(agg),
        number,
        direction: body.direction,
        category: body.category,
        amount: body.amount,
        method: body.method,
        reference: body.reference,
        occurred_at: Utc::now(),
    });

    dispatch_session(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn close_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CloseSessionRequest>,
) -> Response {
    let agg = match parse_id(&id, "session") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CashSessionCommand::Close(CloseSession {
        tenant_id: tenant.tenant_id(),
        session_id: CashSessionId::new(agg),
        counted_balance: body.counted_balance,
        occurred_at: Utc::now(),
    });

    dispatch_session(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "session") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.cash_sessions_get(tenant.tenant_id(), &CashSessionId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::cash_session_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "session not found"),
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct OpenSessionQuery {
    pub store_id: String,
}

/// The currently open session for a store, if any. One register per store.
pub async fn open_session_for_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    axum::extract::Query(query): axum::extract::Query<OpenSessionQuery>,
) -> Response {
    let store = match parse_id(&query.store_id, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };

    match services.cash_session_open_for_store(tenant.tenant_id(), &store) {
        Some(rm) => (StatusCode::OK, Json(dto::cash_session_to_json(rm))).into_response(),
        None => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "no open session for this store",
        ),
    }
}

pub async fn list_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .cash_sessions_list(tenant.tenant_id())
        .into_iter()
        .map(dto::cash_session_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
