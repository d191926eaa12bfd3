//! Customer directory read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_core::TenantId;
use ventora_customers::{CustomerEvent, CustomerId};
use ventora_events::EventEnvelope;

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub code: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub credit_limit: u64,
    pub active: bool,
}

pub struct CustomerDirectoryProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("customers.directory"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(tenant_id, customer_id)
    }

    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<CustomerReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|c| c.code == code)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<CustomerReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "customers.customer" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: CustomerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, customer_id) = match &ev {
            CustomerEvent::Registered(e) => (e.tenant_id, e.customer_id),
            CustomerEvent::ContactUpdated(e) => (e.tenant_id, e.customer_id),
            CustomerEvent::CreditLimitSet(e) => (e.tenant_id, e.customer_id),
            CustomerEvent::Deactivated(e) => (e.tenant_id, e.customer_id),
            CustomerEvent::Reactivated(e) => (e.tenant_id, e.customer_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if customer_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event customer_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            CustomerEvent::Registered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        code: e.code,
                        name: e.name,
                        phone: e.phone,
                        email: e.email,
                        address: e.address,
                        credit_limit: e.credit_limit,
                        active: true,
                    },
                );
            }
            CustomerEvent::ContactUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.name = e.name;
                    rm.phone = e.phone;
                    rm.email = e.email;
                    rm.address = e.address;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::CreditLimitSet(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.credit_limit = e.credit_limit;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::Deactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.active = false;
                    self.store.upsert(tenant_id, e.customer_id, rm);
                }
            }
            CustomerEvent::Reactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.customer_id) {
                    rm.active = true;
                    self.store.upsert(tenant_id, e.customer_id, rm);
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
    use chrono::Utc;
    use uuid::Uuid;

    use ventora_core::{AggregateId, TenantId};
    use ventora_customers::customer::RegisterCustomer;
    use ventora_customers::{Customer, CustomerCommand};
    use ventora_events::{EventEnvelope, execute};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn envelopes_for(
        tenant_id: TenantId,
        customer_id: CustomerId,
        events: &[CustomerEvent],
        start_seq: u64,
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    customer_id.0,
                    "customers.customer",
                    start_seq + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    fn registered(tenant_id: TenantId, customer_id: CustomerId) -> Vec<CustomerEvent> {
        let mut customer = Customer::empty(customer_id);
        execute(
            &mut customer,
            &CustomerCommand::Register(RegisterCustomer {
                tenant_id,
                customer_id,
                code: "CLI001".to_string(),
                name: "Nomo Distribution".to_string(),
                phone: "+237650000001".to_string(),
                email: "contact@nomo.example".to_string(),
                address: "Douala, Akwa".to_string(),
                credit_limit: 500_000,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap()
    }

    #[test]
    fn registration_populates_the_directory() {
        let tenant_id = TenantId::new();
        let customer_id = CustomerId::new(AggregateId::new());
        let projection = CustomerDirectoryProjection::new(InMemoryTenantStore::new());

        let events = registered(tenant_id, customer_id);
        for env in envelopes_for(tenant_id, customer_id, &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        let rm = projection.get(tenant_id, &customer_id).unwrap();
        assert_eq!(rm.code, "CLI001");
        assert_eq!(rm.credit_limit, 500_000);
        assert!(rm.active);
        assert_eq!(projection.find_by_code(tenant_id, "CLI001"), Some(rm));
    }

    #[test]
    fn duplicate_envelopes_are_skipped() {
        let tenant_id = TenantId::new();
        let customer_id = CustomerId::new(AggregateId::new());
        let projection = CustomerDirectoryProjection::new(InMemoryTenantStore::new());

        let events = registered(tenant_id, customer_id);
        let envs = envelopes_for(tenant_id, customer_id, &events, 1);
        projection.apply_envelope(&envs[0]).unwrap();
        projection.apply_envelope(&envs[0]).unwrap();

        assert_eq!(projection.list(tenant_id).len(), 1);
    }

    #[test]
    fn other_tenants_are_invisible() {
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let customer_id = CustomerId::new(AggregateId::new());
        let projection = CustomerDirectoryProjection::new(InMemoryTenantStore::new());

        let events = registered(tenant_a, customer_id);
        for env in envelopes_for(tenant_a, customer_id, &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        assert!(projection.get(tenant_b, &customer_id).is_none());
        assert!(projection.list(tenant_b).is_empty());
    }
}
