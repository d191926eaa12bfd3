//! Job handlers for the tenant lifecycle.
//!
//! Provisioning runs as a background job: create the tenant's schema, then
//! report the outcome back to the company aggregate so the directory shows
//! the real state. The subscription sweep suspends companies whose trial or
//! paid period has lapsed.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use ventora_core::TenantId;
use ventora_events::{EventBus, EventEnvelope};
use ventora_tenants::company::{
    CompleteProvisioning, FailProvisioning, StartProvisioning, SuspendCompany,
};
use ventora_tenants::{Company, CompanyCommand, CompanyId, CompanyStatus, ProvisioningStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::jobs::{Job, JobHandler, JobResult};
use crate::projections::CompanyDirectoryProjection;
use crate::read_model::TenantStore;

const COMPANY_AGGREGATE: &str = "tenants.company";

/// Creates tenant storage. The production impl wraps the Postgres event
/// store's schema DDL; tests use [`NoopSchemaProvisioner`].
pub trait SchemaProvisioner: Send + Sync {
    fn provision(&self, tenant_id: TenantId) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct NoopSchemaProvisioner;

impl SchemaProvisioner for NoopSchemaProvisioner {
    fn provision(&self, _tenant_id: TenantId) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProvisioningPayload {
    company_id: CompanyId,
}

/// Handler for `tenant.provisioning` jobs.
///
/// Walks the company through StartProvisioning, schema creation and
/// CompleteProvisioning. A schema failure is reported via FailProvisioning
/// and the job retries; StartProvisioning accepts a `Failed` state again.
pub fn tenant_provisioning_handler<S, B, P>(
    dispatcher: Arc<CommandDispatcher<S, B>>,
    provisioner: Arc<P>,
) -> JobHandler
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
    P: SchemaProvisioner + 'static,
{
    Box::new(move |job: &Job| {
        let payload: ProvisioningPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(e) => return JobResult::Failure(format!("bad provisioning payload: {e}")),
        };

        let tenant_id = job.tenant_id;
        let company_id = payload.company_id;

        let start = dispatcher.dispatch::<Company>(
            tenant_id,
            company_id.0,
            COMPANY_AGGREGATE,
            CompanyCommand::StartProvisioning(StartProvisioning {
                tenant_id,
                company_id,
                occurred_at: Utc::now(),
            }),
            |_, id| Company::empty(CompanyId::new(id)),
        );

        match start {
            Ok(_) => {}
            // A replayed job after a crash between schema creation and the
            // completion event; the schema DDL below is idempotent, so a
            // retry would also land here. Nothing left to do.
            Err(DispatchError::InvariantViolation(msg))
                if msg.contains("already provisioned") =>
            {
                return JobResult::Success;
            }
            Err(e) => return JobResult::Failure(format!("start provisioning: {e:?}")),
        }

        if let Err(error) = provisioner.provision(tenant_id) {
            warn!(%tenant_id, %error, "tenant schema creation failed");
            let failed = dispatcher.dispatch::<Company>(
                tenant_id,
                company_id.0,
                COMPANY_AGGREGATE,
                CompanyCommand::FailProvisioning(FailProvisioning {
                    tenant_id,
                    company_id,
                    error: error.clone(),
                    occurred_at: Utc::now(),
                }),
                |_, id| Company::empty(CompanyId::new(id)),
            );
            if let Err(e) = failed {
                warn!(%tenant_id, error = ?e, "could not record provisioning failure");
            }
            return JobResult::Failure(error);
        }

        let complete = dispatcher.dispatch::<Company>(
            tenant_id,
            company_id.0,
            COMPANY_AGGREGATE,
            CompanyCommand::CompleteProvisioning(CompleteProvisioning {
                tenant_id,
                company_id,
                occurred_at: Utc::now(),
            }),
            |_, id| Company::empty(CompanyId::new(id)),
        );

        match complete {
            Ok(_) => {
                info!(%tenant_id, %company_id, "tenant provisioned");
                JobResult::Success
            }
            Err(e) => JobResult::Failure(format!("complete provisioning: {e:?}")),
        }
    })
}

/// Handler for `subscription.sweep` jobs.
///
/// Suspends every provisioned company in the job's tenant whose trial or
/// paid period has lapsed. Already-suspended companies are left alone, so
/// the sweep is safe to run on a schedule.
pub fn subscription_sweep_handler<S, B, T>(
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<CompanyDirectoryProjection<T>>,
) -> JobHandler
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
    T: TenantStore<CompanyId, crate::projections::CompanyReadModel> + Send + Sync + 'static,
{
    Box::new(move |job: &Job| {
        let now = Utc::now();
        let mut errors = Vec::new();

        for company in directory.list(job.tenant_id) {
            if company.status == CompanyStatus::Suspended
                || company.provisioning != ProvisioningStatus::Completed
                || company.is_operational(now)
            {
                continue;
            }

            let suspend = dispatcher.dispatch::<Company>(
                job.tenant_id,
                company.company_id.0,
                COMPANY_AGGREGATE,
                CompanyCommand::Suspend(SuspendCompany {
                    tenant_id: job.tenant_id,
                    company_id: company.company_id,
                    reason: "subscription lapsed".to_string(),
                    occurred_at: now,
                }),
                |_, id| Company::empty(CompanyId::new(id)),
            );

            match suspend {
                Ok(_) => {
                    info!(
                        tenant_id = %job.tenant_id,
                        company_id = %company.company_id,
                        "company suspended by subscription sweep"
                    );
                }
                Err(e) => errors.push(format!("{}: {e:?}", company.company_id)),
            }
        }

        if errors.is_empty() {
            JobResult::Success
        } else {
            JobResult::Failure(errors.join("; "))
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use ventora_core::AggregateId;
    use ventora_events::InMemoryEventBus;
    use ventora_tenants::Plan;
    use ventora_tenants::company::RegisterCompany;

    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::jobs::JobKind;
    use crate::read_model::InMemoryTenantStore;

    struct FailingProvisioner;

    impl SchemaProvisioner for FailingProvisioner {
        fn provision(&self, _tenant_id: TenantId) -> Result<(), String> {
            Err("schema creation refused".to_string())
        }
    }

    fn register_company(
        dispatcher: &CommandDispatcher<
            Arc<InMemoryEventStore>,
            Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
        >,
        tenant_id: TenantId,
        trial_ends_at: Option<chrono::DateTime<Utc>>,
    ) -> CompanyId {
        let company_id = CompanyId::new(AggregateId::new());
        dispatcher
            .dispatch::<Company>(
                tenant_id,
                company_id.0,
                COMPANY_AGGREGATE,
                CompanyCommand::Register(RegisterCompany {
                    tenant_id,
                    company_id,
                    name: "Boutique Mballa".to_string(),
                    slug: "boutique-mballa".to_string(),
                    plan: Plan::Starter,
                    currency: "XAF".to_string(),
                    trial_ends_at,
                    occurred_at: Utc::now(),
                }),
                |_, id| Company::empty(CompanyId::new(id)),
            )
            .unwrap();
        company_id
    }

    fn provisioning_job(tenant_id: TenantId, company_id: CompanyId) -> Job {
        Job::new(
            tenant_id,
            JobKind::TenantProvisioning,
            serde_json::json!({ "company_id": company_id }),
        )
    }

    #[test]
    fn provisioning_walks_the_company_to_completed() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));

        let tenant_id = TenantId::new();
        let company_id = register_company(&dispatcher, tenant_id, None);

        let handler =
            tenant_provisioning_handler(dispatcher.clone(), Arc::new(NoopSchemaProvisioner));
        let mut job = provisioning_job(tenant_id, company_id);
        job.mark_running();

        assert!(matches!(handler(&job), JobResult::Success));

        let stream = store.load_stream(tenant_id, company_id.0).unwrap();
        let types: Vec<_> = stream.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "tenants.company.registered",
                "tenants.company.provisioning_started",
                "tenants.company.provisioned",
            ]
        );
    }

    #[test]
    fn schema_failure_is_recorded_and_retriable() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));

        let tenant_id = TenantId::new();
        let company_id = register_company(&dispatcher, tenant_id, None);

        let failing = tenant_provisioning_handler(dispatcher.clone(), Arc::new(FailingProvisioner));
        let mut job = provisioning_job(tenant_id, company_id);
        job.mark_running();
        assert!(matches!(failing(&job), JobResult::Failure(_)));

        let stream = store.load_stream(tenant_id, company_id.0).unwrap();
        assert_eq!(
            stream.last().map(|e| e.event_type.as_str()),
            Some("tenants.company.provisioning_failed")
        );

        // The retry starts from the Failed state and succeeds.
        let fixed = tenant_provisioning_handler(dispatcher, Arc::new(NoopSchemaProvisioner));
        job.mark_running();
        assert!(matches!(fixed(&job), JobResult::Success));
    }

    #[test]
    fn sweep_suspends_lapsed_trials_only() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));

        let tenant_id = TenantId::new();
        let lapsed_trial = Utc::now() - Duration::days(3);
        let company_id = register_company(&dispatcher, tenant_id, Some(lapsed_trial));

        let provision =
            tenant_provisioning_handler(dispatcher.clone(), Arc::new(NoopSchemaProvisioner));
        let mut job = provisioning_job(tenant_id, company_id);
        job.mark_running();
        assert!(matches!(provision(&job), JobResult::Success));

        let directory = Arc::new(CompanyDirectoryProjection::new(InMemoryTenantStore::new()));
        for stored in store.load_stream(tenant_id, company_id.0).unwrap() {
            directory.apply_envelope(&stored.to_envelope()).unwrap();
        }

        let sweep = subscription_sweep_handler(dispatcher, directory);
        let mut sweep_job = Job::new(tenant_id, JobKind::SubscriptionSweep, serde_json::json!({}));
        sweep_job.mark_running();
        assert!(matches!(sweep(&sweep_job), JobResult::Success));

        let stream = store.load_stream(tenant_id, company_id.0).unwrap();
        assert_eq!(
            stream.last().map(|e| e.event_type.as_str()),
            Some("tenants.company.suspended")
        );
    }
}
