//! Open invoices read model.
//!
//! Tracks every issued invoice with its paid-to-date amount. The
//! per-customer outstanding sum feeds the credit limit check on new
//! credit sales.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ventora_core::{DocumentNumber, TenantId};
use ventora_customers::CustomerId;
use ventora_events::EventEnvelope;
use ventora_invoicing::{InvoiceEvent, InvoiceId, PaymentStatus};
use ventora_sales::SaleId;

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub number: DocumentNumber,
    pub sale_id: Option<SaleId>,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    pub paid: u64,
    pub status: PaymentStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
}

impl InvoiceReadModel {
    pub fn outstanding(&self) -> u64 {
        if self.status == PaymentStatus::Cancelled {
            return 0;
        }
        self.total.saturating_sub(self.paid)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, PaymentStatus::Unpaid | PaymentStatus::Partial)
            && self.due_date.is_some_and(|due| due < now)
    }
}

pub struct OpenInvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> OpenInvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("invoicing.open_invoices"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.number.as_str().cmp(b.number.as_str()));
        all
    }

    /// Invoices still carrying a balance.
    pub fn open(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|i| matches!(i.status, PaymentStatus::Unpaid | PaymentStatus::Partial))
            .collect()
    }

    pub fn overdue(&self, tenant_id: TenantId, now: DateTime<Utc>) -> Vec<InvoiceReadModel> {
        self.open(tenant_id)
            .into_iter()
            .filter(|i| i.is_overdue(now))
            .collect()
    }

    /// Total unpaid balance across a customer's invoices.
    pub fn outstanding_for_customer(&self, tenant_id: TenantId, customer_id: &CustomerId) -> u64 {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|i| i.customer_id.as_ref() == Some(customer_id))
            .map(|i| i.outstanding())
            .sum()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "invoicing.invoice" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, invoice_id) = match &ev {
            InvoiceEvent::Issued(e) => (e.tenant_id, e.invoice_id),
            InvoiceEvent::PaymentRegistered(e) => (e.tenant_id, e.invoice_id),
            InvoiceEvent::Paid(e) => (e.tenant_id, e.invoice_id),
            InvoiceEvent::Cancelled(e) => (e.tenant_id, e.invoice_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if invoice_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            InvoiceEvent::Issued(e) => {
                self.store.upsert(
                    tenant_id,
                    e.invoice_id,
                    InvoiceReadModel {
                        invoice_id: e.invoice_id,
                        number: e.number,
                        sale_id: e.sale_id,
                        customer_id: e.customer_id,
                        total: e.total,
                        paid: 0,
                        status: PaymentStatus::Unpaid,
                        due_date: e.due_date,
                        issued_at: e.occurred_at,
                    },
                );
            }
            InvoiceEvent::PaymentRegistered(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.paid = e.paid_total;
                    rm.status = if rm.paid >= rm.total {
                        PaymentStatus::Paid
                    } else {
                        PaymentStatus::Partial
                    };
                    self.store.upsert(tenant_id, e.invoice_id, rm);
                }
            }
            InvoiceEvent::Paid(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.status = PaymentStatus::Paid;
                    self.store.upsert(tenant_id, e.invoice_id, rm);
                }
            }
            InvoiceEvent::Cancelled(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.status = PaymentStatus::Cancelled;
                    self.store.upsert(tenant_id, e.invoice_id, rm);
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
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use ventora_core::{AggregateId, DocumentKind, PaymentMethod};
    use ventora_events::execute;
    use ventora_invoicing::invoice::{IssueInvoice, RegisterPayment};
    use ventora_invoicing::{Invoice, InvoiceCommand};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn envelopes_for(
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        events: &[InvoiceEvent],
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    invoice_id.0,
                    "invoicing.invoice",
                    1 + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    fn issued(
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        customer_id: Option<CustomerId>,
        total: u64,
        due_in: Option<Duration>,
    ) -> (Invoice, Vec<InvoiceEvent>) {
        let mut invoice = Invoice::empty(invoice_id);
        let events = execute(
            &mut invoice,
            &InvoiceCommand::Issue(IssueInvoice {
                tenant_id,
                invoice_id,
                number: ventora_core::DocumentNumber::render(DocumentKind::Invoice, 2026, 1)
                    .unwrap(),
                sale_id: None,
                customer_id,
                total,
                due_date: due_in.map(|d| Utc::now() + d),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (invoice, events)
    }

    #[test]
    fn payments_move_the_status_and_outstanding() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let customer_id = CustomerId::new(AggregateId::new());
        let projection = OpenInvoicesProjection::new(InMemoryTenantStore::new());

        let (mut invoice, mut events) =
            issued(tenant_id, invoice_id, Some(customer_id), 10_000, None);
        events.extend(
            execute(
                &mut invoice,
                &InvoiceCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    invoice_id,
                    amount: 4_000,
                    method: PaymentMethod::Cash,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );

        for env in envelopes_for(tenant_id, invoice_id, &events) {
            projection.apply_envelope(&env).unwrap();
        }

        let rm = projection.get(tenant_id, &invoice_id).unwrap();
        assert_eq!(rm.status, PaymentStatus::Partial);
        assert_eq!(rm.outstanding(), 6_000);
        assert_eq!(
            projection.outstanding_for_customer(tenant_id, &customer_id),
            6_000
        );
        assert_eq!(projection.open(tenant_id).len(), 1);
    }

    #[test]
    fn overdue_needs_a_past_due_date_and_a_balance() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let projection = OpenInvoicesProjection::new(InMemoryTenantStore::new());

        let (_, events) = issued(tenant_id, invoice_id, None, 5_000, Some(Duration::hours(-2)));
        for env in envelopes_for(tenant_id, invoice_id, &events) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.overdue(tenant_id, Utc::now()).len(), 1);
        assert!(
            projection
                .overdue(tenant_id, Utc::now() - Duration::hours(3))
                .is_empty()
        );
    }
}
