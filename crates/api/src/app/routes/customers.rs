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
use ventora_customers::customer::{
    DeactivateCustomer, ReactivateCustomer, RegisterCustomer, SetCreditLimit, UpdateContact,
};
use ventora_customers::{Customer, CustomerCommand, CustomerId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "customers.customer";

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_customer).get(list_customers))
        .route("/:id", get(get_customer).put(update_contact))
        .route("/:id/credit-limit", post(set_credit_limit))
        .route("/:id/deactivate", post(deactivate_customer))
        .route("/:id/reactivate", post(reactivate_customer))
}

fn dispatch_customer(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: CustomerCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("customers.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Customer>(
        tenant.tenant_id(),
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Customer::empty(CustomerId::new(id)),
    ) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> Response {
    let agg = AggregateId::new();

    // Codes are unique per tenant; checked against the read side.
    if services
        .customer_by_code(tenant.tenant_id(), &body.code)
        .is_some()
    {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "duplicate_code",
            format!("customer code {:?} is already in use", body.code),
        );
    }

    let cmd = CustomerCommand::Register(RegisterCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        code: body.code,
        name: body.name,
        phone: body.phone,
        email: body.email,
        address: body.address,
        credit_limit: body.credit_limit,
        occurred_at: Utc::now(),
    });

    dispatch_customer(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn update_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCustomerContactRequest>,
) -> Response {
    let agg = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::UpdateContact(UpdateContact {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        name: body.name,
        phone: body.phone,
        email: body.email,
        address: body.address,
        occurred_at: Utc::now(),
    });

    dispatch_customer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn set_credit_limit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetCreditLimitRequest>,
) -> Response {
    let agg = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::SetCreditLimit(SetCreditLimit {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        credit_limit: body.credit_limit,
        occurred_at: Utc::now(),
    });

    dispatch_customer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn deactivate_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::Deactivate(DeactivateCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_customer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn reactivate_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::Reactivate(ReactivateCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_customer(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.customers_get(tenant.tenant_id(), &CustomerId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::customer_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
    }
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .customers_list(tenant.tenant_id())
        .into_iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
