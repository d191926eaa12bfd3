use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;

use ventora_auth::user::{
    AssignRole, CreateUser, ReinstateUser, RevokeRole, SuspendUser, UpdateProfile,
};
use ventora_auth::{Permission, Role, User, UserCommand};
use ventora_core::{AggregateId, UserId};

use crate::app::routes::common::{CmdAuth, committed_response, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "auth.user";

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_profile))
        .route("/:id/roles", post(assign_role))
        .route("/:id/roles/:role", delete(revoke_role))
        .route("/:id/suspend", post(suspend_user))
        .route("/:id/reinstate", post(reinstate_user))
}

fn dispatch_user(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: UserCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("users.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<User>(tenant.tenant_id(), agg, AGGREGATE, cmd_auth.inner, |_, id| {
        User::empty(UserId::from_uuid(*id.as_uuid()))
    }) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

// A non-admin must not hand out roles they do not hold themselves.
fn escalates(principal: &PrincipalContext, granted: &[Role]) -> bool {
    let roles = principal.roles();
    if roles.contains(&Role::admin()) {
        return false;
    }
    granted.iter().any(|r| !roles.contains(r))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> Response {
    let agg = AggregateId::new();

    let initial_roles: Vec<Role> = body.initial_roles.into_iter().map(Role::new).collect();
    if escalates(&principal, &initial_roles) {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "cannot grant a role you do not hold",
        );
    }

    let cmd = UserCommand::Create(CreateUser {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        email: body.email,
        display_name: body.display_name,
        initial_roles,
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::CREATED)
}

pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProfileRequest>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UserCommand::UpdateProfile(UpdateProfile {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        display_name: body.display_name,
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignRoleRequest>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UserCommand::AssignRole(AssignRole {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        role: Role::new(body.role),
        actor_roles: principal.roles().to_vec(),
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, role)): Path<(String, String)>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UserCommand::RevokeRole(RevokeRole {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        role: Role::new(role),
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn suspend_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UserCommand::Suspend(SuspendUser {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn reinstate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UserCommand::Reinstate(ReinstateUser {
        tenant_id: tenant.tenant_id(),
        user_id: UserId::from_uuid(*agg.as_uuid()),
        occurred_at: Utc::now(),
    });

    dispatch_user(&services, &tenant, &principal, agg, cmd, StatusCode::OK)
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let agg = match parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.users_get(tenant.tenant_id(), &UserId::from_uuid(*agg.as_uuid())) {
        Some(rm) => (StatusCode::OK, Json(dto::user_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    let items = services
        .users_list(tenant.tenant_id())
        .into_iter()
        .map(dto::user_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
