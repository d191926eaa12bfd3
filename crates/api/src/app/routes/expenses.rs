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
use ventora_core::{AggregateId, DocumentKind, UserId};
use ventora_expenses::expense::{
    ApproveExpense, CreateExpense, PayExpense, RejectExpense, SubmitExpense,
};
use ventora_expenses::{Expense, ExpenseCommand, ExpenseId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "expenses.expense";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_expense).get(list_expenses))
        .route("/:id", get(get_expense))
        .route("/:id/submit", post(submit_expense))
        .route("/:id/approve", post(approve_expense))
        .route("/:id/reject", post(reject_expense))
        .route("/:id/pay", post(pay_expense))
}

fn dispatch_expense(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: ExpenseCommand,
    required: Vec<Permission>,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required,
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Expense>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Expense::empty(ExpenseId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn manage() -> Vec<Permission> {
    vec![Permission::new("expenses.manage")]
}

// Approval is a separate permission so a manager can sign off on
// expenses that a cashier or stock keeper recorded.
fn approve() -> Vec<Permission> {
    vec![
        Permission::new("expenses.manage"),
        Permission::new("expenses.approve"),
    ]
}

pub async fn create_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateExpenseRequest>,
) -> Response {
    let agg = AggregateId::new();

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::Expense) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = ExpenseCommand::Create(CreateExpense {
        tenant_id: tenant.tenant_id(),
        expense_id: ExpenseId::new(agg),
        number,
        category: body.category,
        amount: body.amount,
        description: body.description,
        supplier: body.supplier,
        occurred_at: Utc::now(),
    });

    dispatch_expense(
        &services,
        &tenant,
        &principal,
        agg,
        cmd,
        manage(),
        StatusCode::CREATED,
    )
}

pub async fn submit_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "expense") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::Submit(SubmitExpense {
        tenant_id: tenant.tenant_id(),
        expense_id: ExpenseId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_expense(
        &services,
        &tenant,
        &principal,
        agg,
        cmd,
        manage(),
        StatusCode::OK,
    )
}

pub async fn approve_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "expense") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::Approve(ApproveExpense {
        tenant_id: tenant.tenant_id(),
        expense_id: ExpenseId::new(agg),
        approved_by: UserId::from_uuid(*principal.principal_id().as_uuid()),
        occurred_at: Utc::now(),
    });

    dispatch_expense(
        &services,
        &tenant,
        &principal,
        agg,
        cmd,
        approve(),
        StatusCode::OK,
    )
}

pub async fn reject_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "expense") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::Reject(RejectExpense {
        tenant_id: tenant.tenant_id(),
        expense_id: ExpenseId::new(agg),
        rejected_by: UserId::from_uuid(*principal.principal_id().as_uuid()),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_expense(
        &services,
        &tenant,
        &principal,
        agg,
        cmd,
        approve(),
        StatusCode::OK,
    )
}

pub async fn pay_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PayExpenseRequest>,
) -> Response {
    let agg = match parse_id(&id, "expense") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ExpenseCommand::Pay(PayExpense {
        tenant_id: tenant.tenant_id(),
        expense_id: ExpenseId::new(agg),
        method: body.method,
        occurred_at: Utc::now(),
    });

    dispatch_expense(
        &services,
        &tenant,
        &principal,
        agg,
        cmd,
        manage(),
        StatusCode::OK,
    )
}

pub async fn get_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "expense") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.expenses_get(tenant.tenant_id(), &ExpenseId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::expense_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "expense not found"),
    }
}

pub async fn list_expenses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .expenses_list(tenant.tenant_id())
        .into_iter()
        .map(dto::expense_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
