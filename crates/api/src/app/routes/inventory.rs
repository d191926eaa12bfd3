//! Stores, stock movements, transfers and counts.

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
use ventora_inventory::count::{
    BeginCount, CancelCount, CompleteCount, CreateCount, RecordCountLine, ValidateCount,
};
use ventora_inventory::store::{
    AdjustStock, CloseStore, IssueStock, OpenStore, ReceiveStock, ReturnStock, UpdateStore,
};
use ventora_inventory::transfer::{
    AddTransferLine, CancelTransfer, CreateTransfer, ReceiveTransfer, ReceivedLine, SubmitTransfer,
    ValidateTransfer,
};
use ventora_inventory::{
    CountId, InventoryCount, InventoryCountCommand, StockTransfer, StockTransferCommand, Store,
    StoreCommand, StoreId, TransferId,
};
use ventora_products::ProductId;

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const STORE_AGGREGATE: &str = "inventory.store";
const COUNT_AGGREGATE: &str = "inventory.count";
const TRANSFER_AGGREGATE: &str = "inventory.transfer";

pub fn stores_router() -> Router {
    Router::new()
        .route("/", post(open_store))
        .route("/:id", axum::routing::put(update_store))
        .route("/:id/close", post(close_store))
        .route("/:id/stock", get(store_stock))
        .route("/:id/movements", get(store_movements))
        .route("/:id/low-stock", get(store_low_stock))
        .route("/:id/receive", post(receive_stock))
        .route("/:id/issue", post(issue_stock))
        .route("/:id/adjust", post(adjust_stock))
        .route("/:id/return", post(return_stock))
}

pub fn counts_router() -> Router {
    Router::new()
        .route("/", post(create_count))
        .route("/:id/begin", post(begin_count))
        .route("/:id/lines", post(record_count_line))
        .route("/:id/complete", post(complete_count))
        .route("/:id/validate", post(validate_count))
        .route("/:id/cancel", post(cancel_count))
}

pub fn transfers_router() -> Router {
    Router::new()
        .route("/", post(create_transfer))
        .route("/:id/lines", post(add_transfer_line))
        .route("/:id/submit", post(submit_transfer))
        .route("/:id/validate", post(validate_transfer))
        .route("/:id/receive", post(receive_transfer))
        .route("/:id/cancel", post(cancel_transfer))
}

fn dispatch_store(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: StoreCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("inventory.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Store>(
        tenant.tenant_id(),
        agg,
        STORE_AGGREGATE,
        cmd_auth.inner,
        |_, id| Store::empty(StoreId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn dispatch_count(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: InventoryCountCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("counts.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<InventoryCount>(
        tenant.tenant_id(),
        agg,
        COUNT_AGGREGATE,
        cmd_auth.inner,
        |_, id| InventoryCount::empty(CountId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn dispatch_transfer(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: StockTransferCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("transfers.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<StockTransfer>(
        tenant.tenant_id(),
        agg,
        TRANSFER_AGGREGATE,
        cmd_auth.inner,
        |_, id| StockTransfer::empty(TransferId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

// Stores

pub async fn open_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenStoreRequest>,
) -> Response {
    let agg = AggregateId::new();

    let cmd = StoreCommand::Open(OpenStore {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        name: body.name,
        kind: body.kind,
        address: body.address,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn update_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStoreRequest>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = StoreCommand::Update(UpdateStore {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        name: body.name,
        address: body.address,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn close_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = StoreCommand::Close(CloseStore {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockMovementRequest>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    let cmd = StoreCommand::ReceiveStock(ReceiveStock {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        product_id: product,
        quantity: body.quantity,
        reference: body.reference,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn issue_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockMovementRequest>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    // Issues may not drive the level negative; checked against the read side.
    let on_hand = services.stock_on_hand(tenant.tenant_id(), &StoreId::new(agg), &product);
    if on_hand < body.quantity as i64 {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_stock",
            format!("{on_hand} on hand, cannot issue {}", body.quantity),
        );
    }

    let cmd = StoreCommand::IssueStock(IssueStock {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        product_id: product,
        quantity: body.quantity,
        reference: body.reference,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    let on_hand = services.stock_on_hand(tenant.tenant_id(), &StoreId::new(agg), &product);
    if on_hand + body.delta < 0 {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_stock",
            format!("{on_hand} on hand, cannot adjust by {}", body.delta),
        );
    }

    let cmd = StoreCommand::AdjustStock(AdjustStock {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        product_id: product,
        delta: body.delta,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn return_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockMovementRequest>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    let cmd = StoreCommand::ReturnStock(ReturnStock {
        tenant_id: tenant.tenant_id(),
        store_id: StoreId::new(agg),
        product_id: product,
        quantity: body.quantity,
        reference: body.reference,
        occurred_at: Utc::now(),
    });

    dispatch_store(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn store_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let items = services
        .stock_levels(tenant.tenant_id(), &StoreId::new(agg))
        .into_iter()
        .map(dto::stock_level_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn store_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let items = services
        .stock_movements(tenant.tenant_id(), &StoreId::new(agg))
        .into_iter()
        .map(dto::stock_movement_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// Products at or below their minimum stock level in this store.
pub async fn store_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "store") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    let items = services
        .stock_low(tenant_id, &StoreId::new(agg), |product_id| {
            services
                .products_get(tenant_id, product_id)
                .map(|p| p.min_stock_level)
        })
        .into_iter()
        .map(dto::stock_level_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

// Counts

pub async fn create_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateCountRequest>,
) -> Response {
    let agg = AggregateId::new();
    let store = match parse_id(&body.store_id, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::InventoryCount) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = InventoryCountCommand::Create(CreateCount {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        store_id: store,
        number,
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn begin_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "count") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InventoryCountCommand::Begin(BeginCount {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn record_count_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordCountLineRequest>,
) -> Response {
    let agg = match parse_id(&id, "count") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    let cmd = InventoryCountCommand::RecordLine(RecordCountLine {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        product_id: product,
        theoretical: body.theoretical,
        counted: body.counted,
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn complete_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "count") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InventoryCountCommand::Complete(CompleteCount {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn validate_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "count") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InventoryCountCommand::Validate(ValidateCount {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn cancel_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "count") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InventoryCountCommand::Cancel(CancelCount {
        tenant_id: tenant.tenant_id(),
        count_id: CountId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_count(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

// Transfers

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateTransferRequest>,
) -> Response {
    let agg = AggregateId::new();
    let from_store = match parse_id(&body.from_store, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };
    let to_store = match parse_id(&body.to_store, "store") {
        Ok(v) => StoreId::new(v),
        Err(resp) => return resp,
    };

    let cmd = StockTransferCommand::Create(CreateTransfer {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        from_store,
        to_store,
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn add_transfer_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddTransferLineRequest>,
) -> Response {
    let agg = match parse_id(&id, "transfer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match parse_id(&body.product_id, "product") {
        Ok(v) => ProductId::new(v),
        Err(resp) => return resp,
    };

    let cmd = StockTransferCommand::AddLine(AddTransferLine {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        product_id: product,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn submit_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "transfer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = StockTransferCommand::Submit(SubmitTransfer {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn validate_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "transfer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let number = match services.allocate(tenant.tenant_id(), DocumentKind::Transfer) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "numbering_error",
                e.to_string(),
            );
        }
    };

    let cmd = StockTransferCommand::Validate(ValidateTransfer {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        number,
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn receive_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveTransferRequest>,
) -> Response {
    let agg = match parse_id(&id, "transfer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut received = Vec::with_capacity(body.received.len());
    for line in body.received {
        let product = match parse_id(&line.product_id, "product") {
            Ok(v) => ProductId::new(v),
            Err(resp) => return resp,
        };
        received.push(ReceivedLine {
            product_id: product,
            quantity: line.quantity,
        });
    }

    let cmd = StockTransferCommand::Receive(ReceiveTransfer {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        received,
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn cancel_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "transfer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = StockTransferCommand::Cancel(CancelTransfer {
        tenant_id: tenant.tenant_id(),
        transfer_id: TransferId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_transfer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}
