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
use ventora_services::service::{
    DeactivateService, ReactivateService, RegisterService, SetServicePricing, UpdateService,
};
use ventora_services::{Service, ServiceCommand, ServiceId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "services.service";

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_service).get(list_services))
        .route("/:id", get(get_service).put(update_service))
        .route("/:id/pricing", post(set_pricing))
        .route("/:id/deactivate", post(deactivate_service))
        .route("/:id/reactivate", post(reactivate_service))
}

fn dispatch_service(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: ServiceCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("services.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Service>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Service::empty(ServiceId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn register_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterServiceRequest>,
) -> Response {
    let agg = AggregateId::new();

    let cmd = ServiceCommand::Register(RegisterService {
        tenant_id: tenant.tenant_id(),
        service_id: ServiceId::new(agg),
        reference: body.reference,
        name: body.name,
        category: body.category,
        unit_price: body.unit_price,
        tax_rate_bps: body.tax_rate_bps,
        estimated_duration_minutes: body.estimated_duration_minutes,
        occurred_at: Utc::now(),
    });

    dispatch_service(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn update_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateServiceRequest>,
) -> Response {
    let agg = match parse_id(&id, "service") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::Update(UpdateService {
        tenant_id: tenant.tenant_id(),
        service_id: ServiceId::new(agg),
        name: body.name,
        category: body.category,
        estimated_duration_minutes: body.estimated_duration_minutes,
        occurred_at: Utc::now(),
    });

    dispatch_service(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn set_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetServicePricingRequest>,
) -> Response {
    let agg = match parse_id(&id, "service") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::SetPricing(SetServicePricing {
        tenant_id: tenant.tenant_id(),
        service_id: ServiceId::new(agg),
        unit_price: body.unit_price,
        tax_rate_bps: body.tax_rate_bps,
        occurred_at: Utc::now(),
    });

    dispatch_service(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn deactivate_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "service") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::Deactivate(DeactivateService {
        tenant_id: tenant.tenant_id(),
        service_id: ServiceId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_service(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn reactivate_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "service") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::Reactivate(ReactivateService {
        tenant_id: tenant.tenant_id(),
        service_id: ServiceId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_service(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "service") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.services_get(tenant.tenant_id(), &ServiceId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::service_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "service not found"),
    }
}

pub async fn list_services(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .services_list(tenant.tenant_id())
        .into_iter()
        .map(dto::service_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
