//! Expense report read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_core::{DocumentNumber, TenantId, UserId};
use ventora_events::EventEnvelope;
use ventora_expenses::{ExpenseCategory, ExpenseEvent, ExpenseId, ExpenseStatus};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseReadModel {
    pub expense_id: ExpenseId,
    pub number: DocumentNumber,
    pub category: ExpenseCategory,
    pub amount: u64,
    pub description: String,
    pub supplier: Option<String>,
    pub status: ExpenseStatus,
    pub approved_by: Option<UserId>,
}

pub struct ExpenseReportProjection<S>
where
    S: TenantStore<ExpenseId, ExpenseReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> ExpenseReportProjection<S>
where
    S: TenantStore<ExpenseId, ExpenseReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("expenses.report"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, expense_id: &ExpenseId) -> Option<ExpenseReadModel> {
        self.store.get(tenant_id, expense_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ExpenseReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.number.as_str().cmp(b.number.as_str()));
        all
    }

    pub fn list_by_status(&self, tenant_id: TenantId, status: ExpenseStatus) -> Vec<ExpenseReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|e| e.status == status)
            .collect()
    }

    /// Total paid amount per category, for the expense breakdown report.
    pub fn paid_by_category(&self, tenant_id: TenantId) -> Vec<(ExpenseCategory, u64)> {
        let mut totals: Vec<(ExpenseCategory, u64)> = Vec::new();
        for expense in self.store.list(tenant_id) {
            if expense.status != ExpenseStatus::Paid {
                continue;
            }
            match totals.iter_mut().find(|(c, _)| *c == expense.category) {
                Some((_, total)) => *total += expense.amount,
                None => totals.push((expense.category, expense.amount)),
            }
        }
        totals.sort_by(|a, b| b.1.cmp(&a.1));
        totals
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "expenses.expense" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: ExpenseEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, expense_id) = match &ev {
            ExpenseEvent::Created(e) => (e.tenant_id, e.expense_id),
            ExpenseEvent::Submitted(e) => (e.tenant_id, e.expense_id),
            ExpenseEvent::Approved(e) => (e.tenant_id, e.expense_id),
            ExpenseEvent::Rejected(e) => (e.tenant_id, e.expense_id),
            ExpenseEvent::Paid(e) => (e.tenant_id, e.expense_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if expense_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event expense_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ExpenseEvent::Created(e) => {
                self.store.upsert(
                    tenant_id,
                    e.expense_id,
                    ExpenseReadModel {
                        expense_id: e.expense_id,
                        number: e.number,
                        category: e.category,
                        amount: e.amount,
                        description: e.description,
                        supplier: e.supplier,
                        status: ExpenseStatus::Draft,
                        approved_by: None,
                    },
                );
            }
            ExpenseEvent::Submitted(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.expense_id) {
                    rm.status = ExpenseStatus::Pending;
                    self.store.upsert(tenant_id, e.expense_id, rm);
                }
            }
            ExpenseEvent::Approved(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.expense_id) {
                    rm.status = ExpenseStatus::Approved;
                    rm.approved_by = Some(e.approved_by);
                    self.store.upsert(tenant_id, e.expense_id, rm);
                }
            }
            ExpenseEvent::Rejected(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.expense_id) {
                    rm.status = ExpenseStatus::Rejected;
                    self.store.upsert(tenant_id, e.expense_id, rm);
                }
            }
            ExpenseEvent::Paid(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.expense_id) {
                    rm.status = ExpenseStatus::Paid;
                    self.store.upsert(tenant_id, e.expense_id, rm);
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
