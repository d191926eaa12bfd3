//! Platform-level company directory.
//!
//! Unlike the other projections this one serves the operator surface:
//! every company (tenant) on the platform with its plan, provisioning
//! state and subscription standing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ventora_core::TenantId;
use ventora_events::EventEnvelope;
use ventora_tenants::{CompanyEvent, CompanyId, CompanyStatus, Plan, ProvisioningStatus};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyReadModel {
    pub company_id: CompanyId,
    pub name: String,
    pub slug: String,
    pub schema_name: String,
    pub plan: Plan,
    pub currency: String,
    pub status: CompanyStatus,
    pub provisioning: ProvisioningStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub paid_until: Option<DateTime<Utc>>,
    pub suspended_reason: Option<String>,
}

impl CompanyReadModel {
    /// A company can use the product while provisioned and not suspended,
    /// and while its trial or paid period has not lapsed.
    pub fn is_operational(&self, now: DateTime<Utc>) -> bool {
        if self.status == CompanyStatus::Suspended {
            return false;
        }
        if self.provisioning != ProvisioningStatus::Completed {
            return false;
        }
        match (self.paid_until, self.trial_ends_at) {
            (Some(paid), _) => paid >= now,
            (None, Some(trial)) => trial >= now,
            (None, None) => false,
        }
    }
}

pub struct CompanyDirectoryProjection<S>
where
    S: TenantStore<CompanyId, CompanyReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> CompanyDirectoryProjection<S>
where
    S: TenantStore<CompanyId, CompanyReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("tenants.directory"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, company_id: &CompanyId) -> Option<CompanyReadModel> {
        self.store.get(tenant_id, company_id)
    }

    pub fn find_by_slug(&self, tenant_id: TenantId, slug: &str) -> Option<CompanyReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|c| c.slug == slug)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<CompanyReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.slug.cmp(&b.slug));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "tenants.company" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: CompanyEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, company_id) = match &ev {
            CompanyEvent::Registered(e) => (e.tenant_id, e.company_id),
            CompanyEvent::ProvisioningStarted(e) => (e.tenant_id, e.company_id),
            CompanyEvent::Provisioned(e) => (e.tenant_id, e.company_id),
            CompanyEvent::ProvisioningFailed(e) => (e.tenant_id, e.company_id),
            CompanyEvent::PlanChanged(e) => (e.tenant_id, e.company_id),
            CompanyEvent::SubscriptionExtended(e) => (e.tenant_id, e.company_id),
            CompanyEvent::Suspended(e) => (e.tenant_id, e.company_id),
            CompanyEvent::Reinstated(e) => (e.tenant_id, e.company_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if company_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event company_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            CompanyEvent::Registered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.company_id,
                    CompanyReadModel {
                        company_id: e.company_id,
                        name: e.name,
                        slug: e.slug,
                        schema_name: e.schema_name,
                        plan: e.plan,
                        currency: e.currency,
                        status: CompanyStatus::Trial,
                        provisioning: ProvisioningStatus::Pending,
                        trial_ends_at: e.trial_ends_at,
                        paid_until: None,
                        suspended_reason: None,
                    },
                );
            }
            CompanyEvent::ProvisioningStarted(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.provisioning = ProvisioningStatus::InProgress;
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::Provisioned(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.provisioning = ProvisioningStatus::Completed;
                    rm.schema_name = e.schema_name;
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::ProvisioningFailed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.provisioning = ProvisioningStatus::Failed;
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::PlanChanged(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.plan = e.plan;
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::SubscriptionExtended(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.status = CompanyStatus::Active;
                    rm.paid_until = Some(e.paid_until);
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::Suspended(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.status = CompanyStatus::Suspended;
                    rm.suspended_reason = Some(e.reason);
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
            CompanyEvent::Reinstated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.company_id) {
                    rm.status = if rm.paid_until.is_some() {
                        CompanyStatus::Active
                    } else {
                        CompanyStatus::Trial
                    };
                    rm.suspended_reason = None;
                    self.store.upsert(tenant_id, e.company_id, rm);
                }
            }
        }

        self.gate.commit(tenant_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let (envs, tenants) = prepare_rebuild(envelopes);
        for t in tenants {
            self.store.clear_tenant(t);
            self.gate.clear_tenant(t);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use ventora_core::AggregateId;
    use ventora_events::execute;
    use ventora_tenants::company::{
        CompleteProvisioning, ExtendSubscription, RegisterCompany, StartProvisioning,
    };
    use ventora_tenants::{Company, CompanyCommand};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn envelopes_for(
        tenant_id: TenantId,
        company_id: CompanyId,
        events: &[CompanyEvent],
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    company_id.0,
                    "tenants.company",
                    1 + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn lifecycle_reaches_operational_after_provisioning_and_payment() {
        let tenant_id = TenantId::new();
        let company_id = CompanyId::new(AggregateId::new());
        let projection = CompanyDirectoryProjection::new(InMemoryTenantStore::new());
        let now = Utc::now();

        let mut company = Company::empty(company_id);
        let mut events = execute(
            &mut company,
            &CompanyCommand::Register(RegisterCompany {
                tenant_id,
                company_id,
                name: "Quincaillerie du Centre".to_string(),
                slug: "quincaillerie-centre".to_string(),
                plan: Plan::Starter,
                currency: "XAF".to_string(),
                trial_ends_at: Some(now + Duration::days(14)),
                occurred_at: now,
            }),
        )
        .unwrap();
        events.extend(
            execute(
                &mut company,
                &CompanyCommand::StartProvisioning(StartProvisioning {
                    tenant_id,
                    company_id,
                    occurred_at: now,
                }),
            )
            .unwrap(),
        );
        events.extend(
            execute(
                &mut company,
                &CompanyCommand::CompleteProvisioning(CompleteProvisioning {
                    tenant_id,
                    company_id,
                    occurred_at: now,
                }),
            )
            .unwrap(),
        );
        events.extend(
            execute(
                &mut company,
                &CompanyCommand::ExtendSubscription(ExtendSubscription {
                    tenant_id,
                    company_id,
                    paid_until: now + Duration::days(30),
                    occurred_at: now,
                }),
            )
            .unwrap(),
        );

        for env in envelopes_for(tenant_id, company_id, &events) {
            projection.apply_envelope(&env).unwrap();
        }

        let rm = projection.get(tenant_id, &company_id).unwrap();
        assert_eq!(rm.provisioning, ProvisioningStatus::Completed);
        assert_eq!(rm.status, CompanyStatus::Active);
        assert!(rm.is_operational(now));
        assert!(!rm.is_operational(now + Duration::days(31)));
        assert_eq!(
            projection
                .find_by_slug(tenant_id, "quincaillerie-centre")
                .map(|c| c.company_id),
            Some(company_id)
        );
    }
}
