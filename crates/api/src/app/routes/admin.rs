//! Platform administration: company lifecycle, users and background jobs.
//!
//! These routes are reachable even when the tenant's subscription has
//! lapsed, so an admin can extend or reinstate a suspended company.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use ventora_auth::Permission;
use ventora_core::{AggregateId, TenantId};
use ventora_infra::jobs::{Job, JobKind, JobStatus};
use ventora_tenants::company::{
    ChangePlan, ExtendSubscription, RegisterCompany, ReinstateCompany, SuspendCompany,
};
use ventora_tenants::{Company, CompanyCommand, CompanyId};

use crate::app::routes::common::{CmdAuth, committed_response};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const AGGREGATE: &str = "tenants.company";

pub fn router() -> Router {
    Router::new()
        .route("/companies", post(register_company))
        .route("/company", get(get_own_company))
        .route("/company/plan", post(change_plan))
        .route("/company/extend", post(extend_subscription))
        .route("/company/suspend", post(suspend_company))
        .route("/company/reinstate", post(reinstate_company))
        .route("/jobs", get(list_jobs))
        .route("/jobs/sweep", post(enqueue_sweep))
        .route("/replay", post(replay_projections))
        .route("/stream/events", get(stream_events))
        .nest("/users", super::users::router())
}

fn dispatch_company(
    services: &AppServices,
    target_tenant: TenantId,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: CompanyCommand,
    success: StatusCode,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("companies.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(tenant, principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.dispatch::<Company>(target_tenant, agg, AGGREGATE, cmd_auth.inner, |_, id| {
        Company::empty(CompanyId::new(id))
    }) {
        Ok(committed) => committed_response(success, agg, committed.len()),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Register a new company. A fresh tenant id is minted for it and schema
/// provisioning is queued as a background job.
pub async fn register_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterCompanyRequest>,
) -> Response {
    let new_tenant = TenantId::new();
    let agg = AggregateId::new();
    let company_id = CompanyId::new(agg);

    let cmd = CompanyCommand::Register(RegisterCompany {
        tenant_id: new_tenant,
        company_id,
        name: body.name,
        slug: body.slug,
        plan: body.plan,
        currency: body.currency,
        trial_ends_at: body.trial_days.map(|d| Utc::now() + Duration::days(d)),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("companies.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services.dispatch::<Company>(
        new_tenant,
        agg,
        AGGREGATE,
        cmd_auth.inner,
        |_, id| Company::empty(CompanyId::new(id)),
    ) {
        Ok(committed) => committed,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let job = Job::new(
        new_tenant,
        JobKind::TenantProvisioning,
        serde_json::json!({ "company_id": company_id }),
    );
    if let Err(e) = services.enqueue_job(job) {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "job_error",
            e.to_string(),
        );
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "tenant_id": new_tenant.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn get_own_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    match services.company_for_tenant(tenant.tenant_id()) {
        Some(rm) => (StatusCode::OK, Json(dto::company_to_json(rm))).into_response(),
        None => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "no company registered for this tenant",
        ),
    }
}

fn own_company_id(services: &AppServices, tenant: &TenantContext) -> Result<CompanyId, Response> {
    services
        .company_for_tenant(tenant.tenant_id())
        .map(|rm| rm.company_id)
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "no company registered for this tenant",
            )
        })
}

pub async fn change_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ChangePlanRequest>,
) -> Response {
    let company_id = match own_company_id(&services, &tenant) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::ChangePlan(ChangePlan {
        tenant_id: tenant.tenant_id(),
        company_id,
        plan: body.plan,
        occurred_at: Utc::now(),
    });

    dispatch_company(
        &services,
        tenant.tenant_id(),
        &tenant,
        &principal,
        company_id.0,
        cmd,
        StatusCode::OK,
    )
}

pub async fn extend_subscription(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ExtendSubscriptionRequest>,
) -> Response {
    let company_id = match own_company_id(&services, &tenant) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::ExtendSubscription(ExtendSubscription {
        tenant_id: tenant.tenant_id(),
        company_id,
        paid_until: body.paid_until,
        occurred_at: Utc::now(),
    });

    dispatch_company(
        &services,
        tenant.tenant_id(),
        &tenant,
        &principal,
        company_id.0,
        cmd,
        StatusCode::OK,
    )
}

pub async fn suspend_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ReasonRequest>,
) -> Response {
    let company_id = match own_company_id(&services, &tenant) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::Suspend(SuspendCompany {
        tenant_id: tenant.tenant_id(),
        company_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_company(
        &services,
        tenant.tenant_id(),
        &tenant,
        &principal,
        company_id.0,
        cmd,
        StatusCode::OK,
    )
}

pub async fn reinstate_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let company_id = match own_company_id(&services, &tenant) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::Reinstate(ReinstateCompany {
        tenant_id: tenant.tenant_id(),
        company_id,
        occurred_at: Utc::now(),
    });

    dispatch_company(
        &services,
        tenant.tenant_id(),
        &tenant,
        &principal,
        company_id.0,
        cmd,
        StatusCode::OK,
    )
}

/// Queue a subscription sweep for this tenant's company.
pub async fn enqueue_sweep(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("jobs.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let job = Job::new(
        tenant.tenant_id(),
        JobKind::SubscriptionSweep,
        serde_json::json!({}),
    );
    match services.enqueue_job(job) {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "job_id": job_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "job_error",
            e.to_string(),
        ),
    }
}

/// Rebuild this tenant's read models from its event history.
pub async fn replay_projections(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("jobs.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.replay_read_models(tenant.tenant_id()).await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({ "events_replayed": count })),
        )
            .into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "replay_error", e),
    }
}

/// Tenant-scoped event firehose over SSE, for operational monitoring.
pub async fn stream_events(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("jobs.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    crate::app::services::tenant_sse_stream(services, tenant.tenant_id()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

// Variant payloads are placeholders; the store matches on discriminant.
fn parse_status(raw: &str) -> Option<JobStatus> {
    match raw {
        "pending" => Some(JobStatus::Pending),
        "running" => Some(JobStatus::Running),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed {
            error: String::new(),
            attempt: 0,
        }),
        "dead_lettered" => Some(JobStatus::DeadLettered {
            error: String::new(),
            attempts: 0,
        }),
        "cancelled" => Some(JobStatus::Cancelled),
        _ => None,
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("jobs.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let status = match query.status.as_deref() {
        Some(raw) => match parse_status(raw) {
            Some(s) => Some(s),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    format!("unknown job status {raw:?}"),
                );
            }
        },
        None => None,
    };

    let jobs = match services.jobs_by_status(tenant.tenant_id(), status, query.limit.unwrap_or(100))
    {
        Ok(jobs) => jobs,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "job_error",
                e.to_string(),
            );
        }
    };

    let items = jobs
        .into_iter()
        .map(|j| {
            serde_json::json!({
                "id": j.id.to_string(),
                "kind": j.kind.routing_key(),
                "status": j.status,
                "attempt": j.attempt,
                "created_at": j.created_at.to_rfc3339(),
                "scheduled_at": j.scheduled_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
