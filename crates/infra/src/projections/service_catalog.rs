//! Service catalog read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_core::TenantId;
use ventora_events::EventEnvelope;
use ventora_services::{ServiceEvent, ServiceId};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReadModel {
    pub service_id: ServiceId,
    pub reference: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub estimated_duration_minutes: Option<u32>,
    pub active: bool,
}

impl ServiceReadModel {
    /// Unit price with the service's tax applied, truncating.
    pub fn price_with_tax(&self) -> u64 {
        let gross =
            self.unit_price as u128 * (10_000 + self.tax_rate_bps as u128) / 10_000;
        gross as u64
    }
}

pub struct ServiceCatalogProjection<S>
where
    S: TenantStore<ServiceId, ServiceReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> ServiceCatalogProjection<S>
where
    S: TenantStore<ServiceId, ServiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("services.catalog"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, service_id: &ServiceId) -> Option<ServiceReadModel> {
        self.store.get(tenant_id, service_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ServiceReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.reference.cmp(&b.reference));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "services.service" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: ServiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, service_id) = match &ev {
            ServiceEvent::Registered(e) => (e.tenant_id, e.service_id),
            ServiceEvent::Updated(e) => (e.tenant_id, e.service_id),
            ServiceEvent::PricingSet(e) => (e.tenant_id, e.service_id),
            ServiceEvent::Deactivated(e) => (e.tenant_id, e.service_id),
            ServiceEvent::Reactivated(e) => (e.tenant_id, e.service_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if service_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event service_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ServiceEvent::Registered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.service_id,
                    ServiceReadModel {
                        service_id: e.service_id,
                        reference: e.reference,
                        name: e.name,
                        category: e.category,
                        unit_price: e.unit_price,
                        tax_rate_bps: e.tax_rate_bps,
                        estimated_duration_minutes: e.estimated_duration_minutes,
                        active: true,
                    },
                );
            }
            ServiceEvent::Updated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.service_id) {
                    rm.name = e.name;
                    rm.category = e.category;
                    rm.estimated_duration_minutes = e.estimated_duration_minutes;
                    self.store.upsert(tenant_id, e.service_id, rm);
                }
            }
            ServiceEvent::PricingSet(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.service_id) {
                    rm.unit_price = e.unit_price;
                    rm.tax_rate_bps = e.tax_rate_bps;
                    self.store.upsert(tenant_id, e.service_id, rm);
                }
            }
            ServiceEvent::Deactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.service_id) {
                    rm.active = false;
                    self.store.upsert(tenant_id, e.service_id, rm);
                }
            }
            ServiceEvent::Reactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.service_id) {
                    rm.active = true;
                    self.store.upsert(tenant_id, e.service_id, rm);
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
