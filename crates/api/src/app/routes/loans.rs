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
use ventora_core::{AggregateId, DocumentKind};
use ventora_loans::loan::{CancelLoan, GrantLoan, MarkDefaulted, RecordRepayment};
use ventora_loans::{Loan, LoanCommand, LoanId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "loans.loan";

pub fn router() -> Router {
    Router::new()
        .route("/", post(grant_loan).get(list_loans))
        .route("/:id", get(get_loan))
        .route("/:id/repayments", post(record_repayment))
        .route("/:id/default", post(mark_defaulted))
        .route("/:id/cancel", post(cancel_loan))
}

fn dispatch_loan(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: LoanCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("loans.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Loan>(tenant.tenant_id(), agg, AGGREGATE, cmd_auth.inner, |_, id| {
        Loan::empty(LoanId::new(id))
    }) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn grant_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::GrantLoanRequest>,
) -> Response {
    let agg = AggregateId::new();

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::Loan) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = LoanCommand::Grant(GrantLoan {
        tenant_id: tenant.tenant_id(),
        loan_id: LoanId::new(agg),
        number,
        lender: body.lender,
        source: body.source,
        principal: body.principal,
        annual_rate_bps: body.annual_rate_bps,
        term_months: body.term_months,
        occurred_at: Utc::now(),
    });

    dispatch_loan(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn record_repayment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordRepaymentRequest>,
) -> Response {
    let agg = match parse_id(&id, "loan") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = LoanCommand::RecordRepayment(RecordRepayment {
        tenant_id: tenant.tenant_id(),
        loan_id: LoanId::new(agg),
        amount: body.amount,
        method: body.method,
        occurred_at: Utc::now(),
    });

    dispatch_loan(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn mark_defaulted(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "loan") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = LoanCommand::MarkDefaulted(MarkDefaulted {
        tenant_id: tenant.tenant_id(),
        loan_id: LoanId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_loan(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn cancel_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "loan") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = LoanCommand::Cancel(CancelLoan {
        tenant_id: tenant.tenant_id(),
        loan_id: LoanId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_loan(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "loan") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.loans_get(tenant.tenant_id(), &LoanId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::loan_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "loan not found"),
    }
}

pub async fn list_loans(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let outstanding = services.loans_outstanding(tenant.tenant_id());
    let items = services
        .loans_list(tenant.tenant_id())
        .into_iter()
        .map(dto::loan_to_json)
        .collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "items": items,
            "total_outstanding": outstanding,
        })),
    )
        .into_response()
}
