use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::Deserialize;

use ventora_auth::Permission;
use ventora_core::{AggregateId, DocumentKind};
use ventora_customers::CustomerId;
use ventora_inventory::StoreId;
use ventora_sales::sale::{AddSaleLine, CancelSale, ConfirmSale, CreateSale, RemoveSaleLine};
use ventora_sales::{Sale, SaleCommand, SaleId, SaleItem, SaleStatus};
use ventora_services::ServiceId;

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "sales.sale";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_no", delete(remove_line))
        .route("/:id/confirm", post(confirm_sale))
        .route("/:id/cancel", post(cancel_sale))
}

fn dispatch_sale(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: SaleCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("sales.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Sale>(tenant.tenant_id(), agg, AGGREGATE, cmd_auth.inner, |_, id| {
        Sale::empty(SaleId::new(id))
    }) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateSaleRequest>,
) -> Response {
    let agg = AggregateId::new();

    let customer_id = match body.customer_id {
        Some(raw) => match parse_id(&raw, "customer") {
            Ok(v) => Some(CustomerId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let cmd = SaleCommand::Create(CreateSale {
        tenant_id: tenant.tenant_id(),
        sale_id: SaleId::new(agg),
        customer_id,
        occurred_at: Utc::now(),
    });

    dispatch_sale(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddSaleLineRequest>,
) -> Response {
    let agg = match parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item = match (&body.product_id, &body.service_id) {
        (Some(raw), None) => match parse_id(raw, "product") {
            Ok(v) => SaleItem::Product(ventora_products::ProductId::new(v)),
            Err(resp) => return resp,
        },
        (None, Some(raw)) => match parse_id(raw, "service") {
            Ok(v) => SaleItem::Service(ServiceId::new(v)),
            Err(resp) => return resp,
        },
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_line",
                "exactly one of product_id or service_id is required",
            );
        }
    };

    let cmd = SaleCommand::AddLine(AddSaleLine {
        tenant_id: tenant.tenant_id(),
        sale_id: SaleId::new(agg),
        item,
        quantity: body.quantity,
        unit_price: body.unit_price,
        discount_bps: body.discount_bps,
        occurred_at: Utc::now(),
    });

    dispatch_sale(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> Response {
    let agg = match parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = SaleCommand::RemoveLine(RemoveSaleLine {
        tenant_id: tenant.tenant_id(),
        sale_id: SaleId::new(agg),
        line_no,
        occurred_at: Utc::now(),
    });

    dispatch_sale(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

/// Confirm a draft ticket.
///
/// Cross-aggregate checks happen here against the read side: every line
/// must be coverable by on-hand stock in the selling store, and a credit
/// customer must stay within their limit once this ticket's total is added
/// to what they already owe. A credit limit of zero disables the check.
pub async fn confirm_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConfirmSaleRequest>,
) -> Response {
    let agg = match parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match parse_id(&body.store_id, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };

    let sale_id = SaleId::new(agg);
    let Some(draft) = services.sales_get(tenant.tenant_id(), &sale_id) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found");
    };

    for line in &draft.lines {
        // Service lines are labour; only product lines need covering stock.
        let Some(product_id) = line.item.product_id() else {
            continue;
        };
        let on_hand = services.stock_on_hand(tenant.tenant_id(), &store, &product_id);
        if on_hand < line.quantity as i64 {
            return errors::json_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_stock",
                format!(
                    "product {} has {} on hand, line needs {}",
                    product_id, on_hand, line.quantity
                ),
            );
        }
    }

    if let Some(customer_id) = &draft.customer_id {
        if let Some(customer) = services.customers_get(tenant.tenant_id(), customer_id) {
            if customer.credit_limit > 0 {
                let outstanding =
                    services.outstanding_for_customer(tenant.tenant_id(), customer_id);
                if outstanding + draft.total > customer.credit_limit {
                    return errors::json_error(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "credit_limit_exceeded",
                        format!(
                            "outstanding {} plus sale total {} exceeds limit {}",
                            outstanding, draft.total, customer.credit_limit
                        ),
                    );
                }
            }
        }
    }

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::Sale) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = SaleCommand::Confirm(ConfirmSale {
        tenant_id: tenant.tenant_id(),
        sale_id,
        number,
        store_id: store,
        occurred_at: Utc::now(),
    });

    dispatch_sale(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn cancel_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = SaleCommand::Cancel(CancelSale {
        tenant_id: tenant.tenant_id(),
        sale_id: SaleId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_sale(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "sale") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.sales_get(tenant.tenant_id(), &SaleId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::sale_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "sale not found"),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSalesQuery {
    pub status: Option<SaleStatus>,
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ListSalesQuery>,
) -> Response {
    let sales = match query.status {
        Some(status) => services.sales_list_by_status(tenant.tenant_id(), status),
        None => services.sales_list(tenant.tenant_id()),
    };
    let items = sales
        .into_iter()
        .map(dto::sale_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
