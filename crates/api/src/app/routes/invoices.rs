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
use ventora_customers::CustomerId;
use ventora_invoicing::invoice::{CancelInvoice, IssueInvoice, RegisterPayment};
use ventora_invoicing::{Invoice, InvoiceCommand, InvoiceId};
use ventora_sales::SaleId;

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "invoicing.invoice";

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_invoice).get(list_invoices))
        .route("/open", get(list_open))
        .route("/overdue", get(list_overdue))
        .route("/:id", get(get_invoice))
        .route("/:id/payments", post(register_payment))
        .route("/:id/cancel", post(cancel_invoice))
}

fn dispatch_invoice(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: InvoiceCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("invoices.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Invoice>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Invoice::empty(InvoiceId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Issue a standalone invoice.
///
/// Invoices for confirmed sales are issued automatically by the invoicing
/// saga; this endpoint covers invoices with no originating ticket, for
/// example service work billed directly.
pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::IssueInvoiceRequest>,
) -> Response {
    let agg = AggregateId::new();

    let sale_id = match body.sale_id {
        Some(raw) => match parse_id(&raw, "sale") {
            Ok(v) => Some(SaleId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };
    let customer_id = match body.customer_id {
        Some(raw) => match parse_id(&raw, "customer") {
            Ok(v) => Some(CustomerId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::Invoice) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = InvoiceCommand::Issue(IssueInvoice {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(agg),
        number,
        sale_id,
        customer_id,
        total: body.total,
        due_date: body.due_date,
        occurred_at: Utc::now(),
    });

    dispatch_invoice(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn register_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RegisterPaymentRequest>,
) -> Response {
    let agg = match parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InvoiceCommand::RegisterPayment(RegisterPayment {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(agg),
        amount: body.amount,
        method: body.method,
        occurred_at: Utc::now(),
    });

    dispatch_invoice(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InvoiceCommand::Cancel(CancelInvoice {
        tenant_id: tenant.tenant_id(),
        invoice_id: InvoiceId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_invoice(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.invoices_get(tenant.tenant_id(), &InvoiceId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::invoice_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "invoice not found"),
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .invoices_list(tenant.tenant_id())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn list_open(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .invoices_open(tenant.tenant_id())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn list_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .invoices_overdue(tenant.tenant_id())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
