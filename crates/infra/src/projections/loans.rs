//! Loan book read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_core::{DocumentNumber, TenantId};
use ventora_events::EventEnvelope;
use ventora_loans::{LoanEvent, LoanId, LoanSource, LoanStatus};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanReadModel {
    pub loan_id: LoanId,
    pub number: DocumentNumber,
    pub lender: String,
    pub source: LoanSource,
    pub principal: u64,
    pub total_due: u64,
    pub repaid: u64,
    pub status: LoanStatus,
}

impl LoanReadModel {
    pub fn balance(&self) -> u64 {
        self.total_due.saturating_sub(self.repaid)
    }
}

pub struct LoanBookProjection<S>
where
    S: TenantStore<LoanId, LoanReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> LoanBookProjection<S>
where
    S: TenantStore<LoanId, LoanReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("loans.book"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, loan_id: &LoanId) -> Option<LoanReadModel> {
        self.store.get(tenant_id, loan_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<LoanReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.number.as_str().cmp(b.number.as_str()));
        all
    }

    pub fn active(&self, tenant_id: TenantId) -> Vec<LoanReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|l| l.status == LoanStatus::Active)
            .collect()
    }

    /// Outstanding debt across active and defaulted loans.
    pub fn total_outstanding(&self, tenant_id: TenantId) -> u64 {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|l| matches!(l.status, LoanStatus::Active | LoanStatus::Defaulted))
            .map(|l| l.balance())
            .sum()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "loans.loan" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: LoanEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, loan_id) = match &ev {
            LoanEvent::Granted(e) => (e.tenant_id, e.loan_id),
            LoanEvent::RepaymentRecorded(e) => (e.tenant_id, e.loan_id),
            LoanEvent::Settled(e) => (e.tenant_id, e.loan_id),
            LoanEvent::Defaulted(e) => (e.tenant_id, e.loan_id),
            LoanEvent::Cancelled(e) => (e.tenant_id, e.loan_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if loan_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event loan_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            LoanEvent::Granted(e) => {
                self.store.upsert(
                    tenant_id,
                    e.loan_id,
                    LoanReadModel {
                        loan_id: e.loan_id,
                        number: e.number,
                        lender: e.lender,
                        source: e.source,
                        principal: e.principal,
                        total_due: e.total_due,
                        repaid: 0,
                        status: LoanStatus::Active,
                    },
                );
            }
            LoanEvent::RepaymentRecorded(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.loan_id) {
                    rm.repaid = rm.total_due.saturating_sub(e.balance_after);
                    self.store.upsert(tenant_id, e.loan_id, rm);
                }
            }
            LoanEvent::Settled(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.loan_id) {
                    rm.status = LoanStatus::Paid;
                    self.store.upsert(tenant_id, e.loan_id, rm);
                }
            }
            LoanEvent::Defaulted(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.loan_id) {
                    rm.status = LoanStatus::Defaulted;
                    self.store.upsert(tenant_id, e.loan_id, rm);
                }
            }
            LoanEvent::Cancelled(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.loan_id) {
                    rm.status = LoanStatus::Cancelled;
                    self.store.upsert(tenant_id, e.loan_id, rm);
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
