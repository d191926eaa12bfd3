//! Sales history read model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ventora_core::{DocumentNumber, TenantId};
use ventora_customers::CustomerId;
use ventora_events::EventEnvelope;
use ventora_inventory::StoreId;
use ventora_sales::{SaleEvent, SaleId, SaleLine, SaleStatus};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReadModel {
    pub sale_id: SaleId,
    pub status: SaleStatus,
    pub number: Option<DocumentNumber>,
    pub store_id: Option<StoreId>,
    pub customer_id: Option<CustomerId>,
    pub lines: Vec<SaleLine>,
    pub total: u64,
    pub confirmed_at: Option<DateTime<Utc>>,
}

pub struct SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("sales.history"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: &SaleId) -> Option<SaleReadModel> {
        self.store.get(tenant_id, sale_id)
    }

    /// All sales, most recently confirmed first, drafts at the end.
    pub fn list(&self, tenant_id: TenantId) -> Vec<SaleReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| b.confirmed_at.cmp(&a.confirmed_at));
        all
    }

    pub fn list_by_status(&self, tenant_id: TenantId, status: SaleStatus) -> Vec<SaleReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|s| s.status == status)
            .collect()
    }

    /// Sum of confirmed sale totals in `[from, to)`.
    pub fn revenue_between(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> u64 {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.status == SaleStatus::Confirmed)
            .filter(|s| {
                s.confirmed_at
                    .is_some_and(|at| at >= from && at < to)
            })
            .map(|s| s.total)
            .sum()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "sales.sale" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: SaleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, sale_id) = match &ev {
            SaleEvent::Created(e) => (e.tenant_id, e.sale_id),
            SaleEvent::LineAdded(e) => (e.tenant_id, e.sale_id),
            SaleEvent::LineRemoved(e) => (e.tenant_id, e.sale_id),
            SaleEvent::Confirmed(e) => (e.tenant_id, e.sale_id),
            SaleEvent::Completed(e) => (e.tenant_id, e.sale_id),
            SaleEvent::Cancelled(e) => (e.tenant_id, e.sale_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if sale_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event sale_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            SaleEvent::Created(e) => {
                self.store.upsert(
                    tenant_id,
                    e.sale_id,
                    SaleReadModel {
                        sale_id: e.sale_id,
                        status: SaleStatus::Draft,
                        number: None,
                        store_id: None,
                        customer_id: e.customer_id,
                        lines: Vec::new(),
                        total: 0,
                        confirmed_at: None,
                    },
                );
            }
            SaleEvent::LineAdded(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                    rm.lines.push(SaleLine {
                        line_no: e.line_no,
                        item: e.item,
                        quantity: e.quantity,
                        unit_price: e.unit_price,
                        discount_bps: e.discount_bps,
                    });
                    rm.total = rm.lines.iter().map(SaleLine::total).sum();
                    self.store.upsert(tenant_id, e.sale_id, rm);
                }
            }
            SaleEvent::LineRemoved(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                    rm.lines.retain(|l| l.line_no != e.line_no);
                    rm.total = rm.lines.iter().map(SaleLine::total).sum();
                    self.store.upsert(tenant_id, e.sale_id, rm);
                }
            }
            SaleEvent::Confirmed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                    rm.status = SaleStatus::Confirmed;
                    rm.number = Some(e.number);
                    rm.store_id = Some(e.store_id);
                    rm.customer_id = e.customer_id;
                    rm.lines = e.lines;
                    rm.total = e.total;
                    rm.confirmed_at = Some(e.occurred_at);
                    self.store.upsert(tenant_id, e.sale_id, rm);
                }
            }
            SaleEvent::Completed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                    rm.status = SaleStatus::Completed;
                    self.store.upsert(tenant_id, e.sale_id, rm);
                }
            }
            SaleEvent::Cancelled(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.sale_id) {
                    rm.status = SaleStatus::Cancelled;
                    self.store.upsert(tenant_id, e.sale_id, rm);
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

    use ventora_core::{AggregateId, DocumentKind, DocumentNumber};
    use ventora_events::execute;
    use ventora_products::ProductId;
    use ventora_sales::sale::{AddSaleLine, ConfirmSale, CreateSale};
    use ventora_sales::{Sale, SaleCommand, SaleItem};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn envelopes_for(
        tenant_id: TenantId,
        sale_id: SaleId,
        events: &[SaleEvent],
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    sale_id.0,
                    "sales.sale",
                    1 + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    fn confirmed_sale(tenant_id: TenantId, sale_id: SaleId, store_id: StoreId) -> Vec<SaleEvent> {
        let mut sale = Sale::empty(sale_id);
        let mut events = execute(
            &mut sale,
            &SaleCommand::Create(CreateSale {
                tenant_id,
                sale_id,
                customer_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        events.extend(
            execute(
                &mut sale,
                &SaleCommand::AddLine(AddSaleLine {
                    tenant_id,
                    sale_id,
                    item: SaleItem::Product(ProductId::new(AggregateId::new())),
                    quantity: 2,
                    unit_price: 1_500,
                    discount_bps: 0,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );
        events.extend(
            execute(
                &mut sale,
                &SaleCommand::Confirm(ConfirmSale {
                    tenant_id,
                    sale_id,
                    number: DocumentNumber::render(DocumentKind::Sale, 2026, 1).unwrap(),
                    store_id,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );
        events
    }

    #[test]
    fn confirmation_snapshots_number_store_and_total() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let store_id = StoreId::new(AggregateId::new());
        let projection = SalesProjection::new(InMemoryTenantStore::new());

        let events = confirmed_sale(tenant_id, sale_id, store_id);
        for env in envelopes_for(tenant_id, sale_id, &events) {
            projection.apply_envelope(&env).unwrap();
        }

        let rm = projection.get(tenant_id, &sale_id).unwrap();
        assert_eq!(rm.status, SaleStatus::Confirmed);
        assert_eq!(rm.number.as_ref().map(|n| n.as_str()), Some("VTE2026000001"));
        assert_eq!(rm.store_id, Some(store_id));
        assert_eq!(rm.total, 3_000);
        assert_eq!(rm.lines.len(), 1);
    }

    #[test]
    fn revenue_only_counts_confirmed_sales_in_range() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let store_id = StoreId::new(AggregateId::new());
        let projection = SalesProjection::new(InMemoryTenantStore::new());

        let events = confirmed_sale(tenant_id, sale_id, store_id);
        for env in envelopes_for(tenant_id, sale_id, &events) {
            projection.apply_envelope(&env).unwrap();
        }

        let now = Utc::now();
        let hour = chrono::Duration::hours(1);
        assert_eq!(projection.revenue_between(tenant_id, now - hour, now + hour), 3_000);
        assert_eq!(projection.revenue_between(tenant_id, now + hour, now + hour + hour), 0);
    }
}
