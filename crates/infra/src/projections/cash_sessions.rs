//! Cash register session read model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ventora_cashbox::{CashSessionEvent, CashSessionId, SessionStatus};
use ventora_core::{TenantId, UserId};
use ventora_events::EventEnvelope;
use ventora_inventory::StoreId;

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashSessionReadModel {
    pub session_id: CashSessionId,
    pub store_id: StoreId,
    pub cashier_id: UserId,
    pub status: SessionStatus,
    pub opening_balance: u64,
    /// Running expected balance (opening plus movements).
    pub expected_balance: u64,
    pub movement_count: u32,
    pub counted_balance: Option<u64>,
    /// `counted - expected` at close. Negative means a shortage.
    pub difference: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

pub struct CashSessionsProjection<S>
where
    S: TenantStore<CashSessionId, CashSessionReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> CashSessionsProjection<S>
where
    S: TenantStore<CashSessionId, CashSessionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("cashbox.sessions"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, session_id: &CashSessionId) -> Option<CashSessionReadModel> {
        self.store.get(tenant_id, session_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<CashSessionReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        all
    }

    /// The open session for a store, if any. One per store at a time.
    pub fn open_for_store(&self, tenant_id: TenantId, store_id: &StoreId) -> Option<CashSessionReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|s| s.status == SessionStatus::Open && s.store_id == *store_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "cashbox.session" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: CashSessionEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, session_id) = match &ev {
            CashSessionEvent::Opened(e) => (e.tenant_id, e.session_id),
            CashSessionEvent::MovementRecorded(e) => (e.tenant_id, e.session_id),
            CashSessionEvent::Closed(e) => (e.tenant_id, e.session_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if session_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event session_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            CashSessionEvent::Opened(e) => {
                self.store.upsert(
                    tenant_id,
                    e.session_id,
                    CashSessionReadModel {
                        session_id: e.session_id,
                        store_id: e.store_id,
                        cashier_id: e.cashier_id,
                        status: SessionStatus::Open,
                        opening_balance: e.opening_balance,
                        expected_balance: e.opening_balance,
                        movement_count: 0,
                        counted_balance: None,
                        difference: None,
                        opened_at: e.occurred_at,
                        closed_at: None,
                    },
                );
            }
            CashSessionEvent::MovementRecorded(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.session_id) {
                    rm.expected_balance = e.balance_after;
                    rm.movement_count += 1;
                    self.store.upsert(tenant_id, e.session_id, rm);
                }
            }
            CashSessionEvent::Closed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.session_id) {
                    rm.status = SessionStatus::Closed;
                    rm.expected_balance = e.expected_balance;
                    rm.counted_balance = Some(e.counted_balance);
                    rm.difference = Some(e.difference);
                    rm.closed_at = Some(e.occurred_at);
                    self.store.upsert(tenant_id, e.session_id, rm);
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
