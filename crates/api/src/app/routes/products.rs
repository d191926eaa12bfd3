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
use ventora_core::AggregateId;
use ventora_products::product::{
    DeactivateProduct, ReactivateProduct, RegisterProduct, UpdateDetails, UpdatePrices,
};
use ventora_products::{Product, ProductCommand, ProductId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "products.product";

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_product).get(list_products))
        .route("/:id", get(get_product).put(update_details))
        .route("/:id/prices", post(update_prices))
        .route("/:id/deactivate", post(deactivate_product))
        .route("/:id/reactivate", post(reactivate_product))
}

fn dispatch_product(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: ProductCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("products.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Product>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterProductRequest>,
) -> Response {
    let agg = AggregateId::new();

    let cmd = ProductCommand::Register(RegisterProduct {
        tenant_id: tenant.tenant_id(),
        product_id: ProductId::new(agg),
        sku: body.sku,
        name: body.name,
        category: body.category,
        unit: body.unit,
        purchase_price: body.purchase_price,
        selling_price: body.selling_price,
        min_stock_level: body.min_stock_level,
        occurred_at: Utc::now(),
    });

    dispatch_product(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn update_details(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductDetailsRequest>,
) -> Response {
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::UpdateDetails(UpdateDetails {
        tenant_id: tenant.tenant_id(),
        product_id: ProductId::new(agg),
        name: body.name,
        category: body.category,
        unit: body.unit,
        min_stock_level: body.min_stock_level,
        occurred_at: Utc::now(),
    });

    dispatch_product(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn update_prices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductPricesRequest>,
) -> Response {
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::UpdatePrices(UpdatePrices {
        tenant_id: tenant.tenant_id(),
        product_id: ProductId::new(agg),
        purchase_price: body.purchase_price,
        selling_price: body.selling_price,
        occurred_at: Utc::now(),
    });

    dispatch_product(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn deactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::Deactivate(DeactivateProduct {
        tenant_id: tenant.tenant_id(),
        product_id: ProductId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_product(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn reactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::Reactivate(ReactivateProduct {
        tenant_id: tenant.tenant_id(),
        product_id: ProductId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_product(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.products_get(tenant.tenant_id(), &ProductId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::product_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .products_list(tenant.tenant_id())
        .into_iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
