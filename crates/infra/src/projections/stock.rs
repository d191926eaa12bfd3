//! Per-store stock levels and movement ledger.
//!
//! Consumes four streams. Store events move stock directly (receipts,
//! issues, adjustments, returns). Transfer validation takes the sent
//! quantities out of the source store, reception puts them into the
//! destination, and cancelling an in-transit transfer restores the
//! source. Count validation applies the recorded discrepancies. Sale
//! confirmation issues the sold quantities from the selling store, and
//! cancelling a confirmed sale returns them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ventora_core::TenantId;
use ventora_events::EventEnvelope;
use ventora_inventory::transfer::ReceivedLine;
use ventora_inventory::{InventoryCountEvent, StockTransferEvent, StoreEvent, StoreId, TransferId};
use ventora_products::ProductId;
use ventora_sales::SaleEvent;

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementKind {
    Receipt,
    Issue,
    Transfer,
    Adjustment,
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovementRecord {
    pub product_id: ProductId,
    pub kind: StockMovementKind,
    /// Signed quantity. Issues are negative.
    pub delta: i64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub on_hand: i64,
}

/// Per-store view held in the tenant store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStockReadModel {
    pub levels: HashMap<ProductId, i64>,
    pub movements: Vec<StockMovementRecord>,
    pub closed: bool,
}

/// What a validated transfer froze, kept until it is received or cancelled.
struct TransferFacts {
    from_store: StoreId,
    to_store: StoreId,
    reference: String,
    sent: Vec<ReceivedLine>,
}

pub struct StockLevelsProjection<S>
where
    S: TenantStore<StoreId, StoreStockReadModel>,
{
    store: S,
    gate: EnvelopeGate,
    in_transit: RwLock<HashMap<(TenantId, TransferId), TransferFacts>>,
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<StoreId, StoreStockReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("inventory.stock_levels"),
            in_transit: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    /// On-hand quantity for one product in one store. Unknown pairs are 0.
    pub fn on_hand(&self, tenant_id: TenantId, store_id: &StoreId, product_id: &ProductId) -> i64 {
        self.store
            .get(tenant_id, store_id)
            .and_then(|s| s.levels.get(product_id).copied())
            .unwrap_or(0)
    }

    /// All non-zero levels for a store, sorted by product id.
    pub fn levels(&self, tenant_id: TenantId, store_id: &StoreId) -> Vec<StockLevel> {
        let Some(state) = self.store.get(tenant_id, store_id) else {
            return Vec::new();
        };
        let mut out: Vec<_> = state
            .levels
            .iter()
            .filter(|(_, qty)| **qty != 0)
            .map(|(product_id, qty)| StockLevel {
                store_id: *store_id,
                product_id: *product_id,
                on_hand: *qty,
            })
            .collect();
        out.sort_by_key(|l| *l.product_id.0.as_uuid().as_bytes());
        out
    }

    /// Movement ledger for a store, oldest first.
    pub fn movements(&self, tenant_id: TenantId, store_id: &StoreId) -> Vec<StockMovementRecord> {
        self.store
            .get(tenant_id, store_id)
            .map(|s| s.movements)
            .unwrap_or_default()
    }

    /// Levels at or below the minimum returned by `min_level_for`.
    ///
    /// The caller supplies thresholds (usually from the product catalog) so
    /// this projection stays independent of product data.
    pub fn low_stock(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
        min_level_for: impl Fn(&ProductId) -> Option<i64>,
    ) -> Vec<StockLevel> {
        let Some(state) = self.store.get(tenant_id, store_id) else {
            return Vec::new();
        };
        let mut out: Vec<_> = state
            .levels
            .iter()
            .filter(|(product_id, qty)| {
                min_level_for(product_id).is_some_and(|min| **qty <= min)
            })
            .map(|(product_id, qty)| StockLevel {
                store_id: *store_id,
                product_id: *product_id,
                on_hand: *qty,
            })
            .collect();
        out.sort_by_key(|l| *l.product_id.0.as_uuid().as_bytes());
        out
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            "inventory.store" => self.apply_store(envelope),
            "inventory.transfer" => self.apply_transfer(envelope),
            "inventory.count" => self.apply_count(envelope),
            "sales.sale" => self.apply_sale(envelope),
            _ => Ok(()),
        }
    }

    fn apply_store(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: StoreEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, store_id) = match &ev {
            StoreEvent::Opened(e) => (e.tenant_id, e.store_id),
            StoreEvent::Updated(e) => (e.tenant_id, e.store_id),
            StoreEvent::Closed(e) => (e.tenant_id, e.store_id),
            StoreEvent::StockReceived(e) => (e.tenant_id, e.store_id),
            StoreEvent::StockIssued(e) => (e.tenant_id, e.store_id),
            StoreEvent::StockAdjusted(e) => (e.tenant_id, e.store_id),
            StoreEvent::StockReturned(e) => (e.tenant_id, e.store_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if store_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event store_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut state = self.store.get(tenant_id, &store_id).unwrap_or_default();

        match ev {
            StoreEvent::Opened(_) | StoreEvent::Updated(_) => {}
            StoreEvent::Closed(_) => {
                state.closed = true;
            }
            StoreEvent::StockReceived(e) => {
                *state.levels.entry(e.product_id).or_insert(0) += e.quantity as i64;
                state.movements.push(StockMovementRecord {
                    product_id: e.product_id,
                    kind: StockMovementKind::Receipt,
                    delta: e.quantity as i64,
                    reference: e.reference,
                    occurred_at: e.occurred_at,
                });
            }
            StoreEvent::StockIssued(e) => {
                *state.levels.entry(e.product_id).or_insert(0) -= e.quantity as i64;
                state.movements.push(StockMovementRecord {
                    product_id: e.product_id,
                    kind: StockMovementKind::Issue,
                    delta: -(e.quantity as i64),
                    reference: e.reference,
                    occurred_at: e.occurred_at,
                });
            }
            StoreEvent::StockAdjusted(e) => {
                *state.levels.entry(e.product_id).or_insert(0) += e.delta;
                state.movements.push(StockMovementRecord {
                    product_id: e.product_id,
                    kind: StockMovementKind::Adjustment,
                    delta: e.delta,
                    reference: e.reason,
                    occurred_at: e.occurred_at,
                });
            }
            StoreEvent::StockReturned(e) => {
                *state.levels.entry(e.product_id).or_insert(0) += e.quantity as i64;
                state.movements.push(StockMovementRecord {
                    product_id: e.product_id,
                    kind: StockMovementKind::Return,
                    delta: e.quantity as i64,
                    reference: e.reference,
                    occurred_at: e.occurred_at,
                });
            }
        }

        self.store.upsert(tenant_id, store_id, state);
        self.gate.commit(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_transfer(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: StockTransferEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            StockTransferEvent::Created(e) => e.tenant_id,
            StockTransferEvent::LineAdded(e) => e.tenant_id,
            StockTransferEvent::Submitted(e) => e.tenant_id,
            StockTransferEvent::Validated(e) => e.tenant_id,
            StockTransferEvent::Received(e) => e.tenant_id,
            StockTransferEvent::Cancelled(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            StockTransferEvent::Created(_)
            | StockTransferEvent::LineAdded(_)
            | StockTransferEvent::Submitted(_) => {}
            StockTransferEvent::Validated(e) => {
                let reference = e.number.as_str().to_string();
                let mut source = self.store.get(tenant_id, &e.from_store).unwrap_or_default();
                for line in &e.sent {
                    *source.levels.entry(line.product_id).or_insert(0) -= line.quantity as i64;
                    source.movements.push(StockMovementRecord {
                        product_id: line.product_id,
                        kind: StockMovementKind::Transfer,
                        delta: -(line.quantity as i64),
                        reference: reference.clone(),
                        occurred_at: e.occurred_at,
                    });
                }
                self.store.upsert(tenant_id, e.from_store, source);
                if let Ok(mut in_transit) = self.in_transit.write() {
                    in_transit.insert(
                        (tenant_id, e.transfer_id),
                        TransferFacts {
                            from_store: e.from_store,
                            to_store: e.to_store,
                            reference,
                            sent: e.sent,
                        },
                    );
                }
            }
            StockTransferEvent::Received(e) => {
                let facts = match self.in_transit.write() {
                    Ok(mut in_transit) => in_transit.remove(&(tenant_id, e.transfer_id)),
                    Err(_) => None,
                };
                if let Some(facts) = facts {
                    let mut dest = self.store.get(tenant_id, &facts.to_store).unwrap_or_default();
                    for line in &e.received {
                        *dest.levels.entry(line.product_id).or_insert(0) += line.quantity as i64;
                        dest.movements.push(StockMovementRecord {
                            product_id: line.product_id,
                            kind: StockMovementKind::Transfer,
                            delta: line.quantity as i64,
                            reference: facts.reference.clone(),
                            occurred_at: e.occurred_at,
                        });
                    }
                    self.store.upsert(tenant_id, facts.to_store, dest);
                }
            }
            StockTransferEvent::Cancelled(e) => {
                // Only a validated (in-transit) cancellation moves stock back.
                let facts = match self.in_transit.write() {
                    Ok(mut in_transit) => in_transit.remove(&(tenant_id, e.transfer_id)),
                    Err(_) => None,
                };
                if let Some(facts) = facts {
                    let mut source =
                        self.store.get(tenant_id, &facts.from_store).unwrap_or_default();
                    for line in &facts.sent {
                        *source.levels.entry(line.product_id).or_insert(0) +=
                            line.quantity as i64;
                        source.movements.push(StockMovementRecord {
                            product_id: line.product_id,
                            kind: StockMovementKind::Transfer,
                            delta: line.quantity as i64,
                            reference: facts.reference.clone(),
                            occurred_at: e.occurred_at,
                        });
                    }
                    self.store.upsert(tenant_id, facts.from_store, source);
                }
            }
        }

        self.gate.commit(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_count(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: InventoryCountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            InventoryCountEvent::Created(e) => e.tenant_id,
            InventoryCountEvent::Started(e) => e.tenant_id,
            InventoryCountEvent::LineRecorded(e) => e.tenant_id,
            InventoryCountEvent::Completed(e) => e.tenant_id,
            InventoryCountEvent::Validated(e) => e.tenant_id,
            InventoryCountEvent::Cancelled(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if let InventoryCountEvent::Validated(e) = ev {
            let reference = format!("count {}", e.count_id);
            let mut state = self.store.get(tenant_id, &e.store_id).unwrap_or_default();
            for d in &e.discrepancies {
                *state.levels.entry(d.product_id).or_insert(0) += d.delta;
                state.movements.push(StockMovementRecord {
                    product_id: d.product_id,
                    kind: StockMovementKind::Adjustment,
                    delta: d.delta,
                    reference: reference.clone(),
                    occurred_at: e.occurred_at,
                });
            }
            self.store.upsert(tenant_id, e.store_id, state);
        }

        self.gate.commit(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_sale(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: SaleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            SaleEvent::Created(e) => e.tenant_id,
            SaleEvent::LineAdded(e) => e.tenant_id,
            SaleEvent::LineRemoved(e) => e.tenant_id,
            SaleEvent::Confirmed(e) => e.tenant_id,
            SaleEvent::Completed(e) => e.tenant_id,
            SaleEvent::Cancelled(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            SaleEvent::Created(_)
            | SaleEvent::LineAdded(_)
            | SaleEvent::LineRemoved(_)
            | SaleEvent::Completed(_) => {}
            SaleEvent::Confirmed(e) => {
                let reference = e.number.as_str().to_string();
                let mut state = self.store.get(tenant_id, &e.store_id).unwrap_or_default();
                // Service lines carry no product and never touch stock.
                for line in &e.lines {
                    let Some(product_id) = line.item.product_id() else {
                        continue;
                    };
                    *state.levels.entry(product_id).or_insert(0) -= line.quantity as i64;
                    state.movements.push(StockMovementRecord {
                        product_id,
                        kind: StockMovementKind::Issue,
                        delta: -(line.quantity as i64),
                        reference: reference.clone(),
                        occurred_at: e.occurred_at,
                    });
                }
                self.store.upsert(tenant_id, e.store_id, state);
            }
            SaleEvent::Cancelled(e) => {
                // store_id is only set when the sale had been confirmed.
                if let Some(store_id) = e.store_id {
                    let reference = format!("annulation {}", e.sale_id);
                    let mut state = self.store.get(tenant_id, &store_id).unwrap_or_default();
                    for line in &e.lines {
                        let Some(product_id) = line.item.product_id() else {
                            continue;
                        };
                        *state.levels.entry(product_id).or_insert(0) += line.quantity as i64;
                        state.movements.push(StockMovementRecord {
                            product_id,
                            kind: StockMovementKind::Return,
                            delta: line.quantity as i64,
                            reference: reference.clone(),
                            occurred_at: e.occurred_at,
                        });
                    }
                    self.store.upsert(tenant_id, store_id, state);
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
            if let Ok(mut in_transit) = self.in_transit.write() {
                in_transit.retain(|(tenant, _), _| *tenant != t);
            }
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
    use ventora_events::{EventEnvelope, execute};
    use ventora_inventory::store::{OpenStore, ReceiveStock};
    use ventora_inventory::{Store, StoreCommand, StoreKind};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn envelopes_for(
        tenant_id: TenantId,
        store_id: StoreId,
        events: &[StoreEvent],
        start_seq: u64,
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    store_id.0,
                    "inventory.store",
                    start_seq + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn receipts_and_issues_move_the_level() {
        let tenant_id = TenantId::new();
        let store_id = StoreId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let projection = StockLevelsProjection::new(InMemoryTenantStore::new());

        let mut aggregate = Store::empty(store_id);
        let mut events = execute(
            &mut aggregate,
            &StoreCommand::Open(OpenStore {
                tenant_id,
                store_id,
                name: "Magasin central".to_string(),
                kind: StoreKind::Both,
                address: "Yaoundé".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        events.extend(
            execute(
                &mut aggregate,
                &StoreCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    store_id,
                    product_id,
                    quantity: 40,
                    reference: "BL-001".to_string(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );

        for env in envelopes_for(tenant_id, store_id, &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.on_hand(tenant_id, &store_id, &product_id), 40);
        let movements = projection.movements(tenant_id, &store_id);
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, StockMovementKind::Receipt);
        assert_eq!(movements[0].delta, 40);
    }

    #[test]
    fn low_stock_uses_caller_thresholds() {
        let tenant_id = TenantId::new();
        let store_id = StoreId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let projection = StockLevelsProjection::new(InMemoryTenantStore::new());

        let mut aggregate = Store::empty(store_id);
        let mut events = execute(
            &mut aggregate,
            &StoreCommand::Open(OpenStore {
                tenant_id,
                store_id,
                name: "Dépôt".to_string(),
                kind: StoreKind::Warehouse,
                address: "Douala".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        events.extend(
            execute(
                &mut aggregate,
                &StoreCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    store_id,
                    product_id,
                    quantity: 3,
                    reference: "BL-002".to_string(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );

        for env in envelopes_for(tenant_id, store_id, &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        let low = projection.low_stock(tenant_id, &store_id, |p| {
            (*p == product_id).then_some(5)
        });
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].on_hand, 3);

        let fine = projection.low_stock(tenant_id, &store_id, |p| {
            (*p == product_id).then_some(2)
        });
        assert!(fine.is_empty());
    }

    #[test]
    fn sequence_gaps_are_rejected() {
        let tenant_id = TenantId::new();
        let store_id = StoreId::new(AggregateId::new());
        let projection = StockLevelsProjection::new(InMemoryTenantStore::new());

        let mut aggregate = Store::empty(store_id);
        let events = execute(
            &mut aggregate,
            &StoreCommand::Open(OpenStore {
                tenant_id,
                store_id,
                name: "Magasin".to_string(),
                kind: StoreKind::Retail,
                address: "Bafoussam".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        // First event numbered 1, then a duplicate payload at sequence 3.
        let envs = envelopes_for(tenant_id, store_id, &events, 1);
        projection.apply_envelope(&envs[0]).unwrap();

        let gap = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            store_id.0,
            "inventory.store",
            3,
            serde_json::to_value(&events[0]).unwrap(),
        );
        let err = projection.apply_envelope(&gap).unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::NonMonotonicSequence { last: 1, found: 3 }
        ));
    }

    fn envelopes_of<T: serde::Serialize>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        events: &[T],
        start_seq: u64,
    ) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    aggregate_id,
                    aggregate_type,
                    start_seq + i as u64,
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect()
    }

    fn seed_store(
        projection: &StockLevelsProjection<InMemoryTenantStore<StoreId, StoreStockReadModel>>,
        tenant_id: TenantId,
        store_id: StoreId,
        product_id: ProductId,
        quantity: u64,
    ) {
        let mut aggregate = Store::empty(store_id);
        let mut events = execute(
            &mut aggregate,
            &StoreCommand::Open(OpenStore {
                tenant_id,
                store_id,
                name: "Magasin".to_string(),
                kind: StoreKind::Both,
                address: "Yaoundé".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        events.extend(
            execute(
                &mut aggregate,
                &StoreCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    store_id,
                    product_id,
                    quantity,
                    reference: "BL-100".to_string(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap(),
        );
        for env in envelopes_for(tenant_id, store_id, &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }
    }

    #[test]
    fn transfer_moves_stock_from_source_to_destination() {
        use ventora_core::{DocumentKind, DocumentNumber};
        use ventora_inventory::transfer::{
            AddTransferLine, CreateTransfer, ReceiveTransfer, SubmitTransfer, ValidateTransfer,
        };
        use ventora_inventory::{StockTransfer, StockTransferCommand};

        let tenant_id = TenantId::new();
        let source = StoreId::new(AggregateId::new());
        let dest = StoreId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let projection = StockLevelsProjection::new(InMemoryTenantStore::new());

        seed_store(&projection, tenant_id, source, product_id, 10);

        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = StockTransfer::empty(transfer_id);
        let now = Utc::now();
        let commands = [
            StockTransferCommand::Create(CreateTransfer {
                tenant_id,
                transfer_id,
                from_store: source,
                to_store: dest,
                occurred_at: now,
            }),
            StockTransferCommand::AddLine(AddTransferLine {
                tenant_id,
                transfer_id,
                product_id,
                quantity: 4,
                occurred_at: now,
            }),
            StockTransferCommand::Submit(SubmitTransfer {
                tenant_id,
                transfer_id,
                occurred_at: now,
            }),
            StockTransferCommand::Validate(ValidateTransfer {
                tenant_id,
                transfer_id,
                number: DocumentNumber::render(DocumentKind::Transfer, 2026, 1).unwrap(),
                occurred_at: now,
            }),
        ];
        let mut events = Vec::new();
        for cmd in &commands {
            events.extend(execute(&mut transfer, cmd).unwrap());
        }
        for env in envelopes_of(tenant_id, transfer_id.0, "inventory.transfer", &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.on_hand(tenant_id, &source, &product_id), 6);
        assert_eq!(projection.on_hand(tenant_id, &dest, &product_id), 0);

        let received = execute(
            &mut transfer,
            &StockTransferCommand::Receive(ReceiveTransfer {
                tenant_id,
                transfer_id,
                received: vec![ReceivedLine {
                    product_id,
                    quantity: 4,
                }],
                occurred_at: now,
            }),
        )
        .unwrap();
        for env in envelopes_of(
            tenant_id,
            transfer_id.0,
            "inventory.transfer",
            &received,
            1 + events.len() as u64,
        ) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.on_hand(tenant_id, &source, &product_id), 6);
        assert_eq!(projection.on_hand(tenant_id, &dest, &product_id), 4);
        let dest_moves = projection.movements(tenant_id, &dest);
        assert_eq!(dest_moves.len(), 1);
        assert_eq!(dest_moves[0].kind, StockMovementKind::Transfer);
        assert!(dest_moves[0].reference.starts_with("TR"));
    }

    #[test]
    fn confirmed_sale_issues_stock_and_cancellation_returns_it() {
        use ventora_core::{DocumentKind, DocumentNumber};
        use ventora_sales::sale::{AddSaleLine, CancelSale, ConfirmSale, CreateSale};
        use ventora_sales::{Sale, SaleCommand, SaleId, SaleItem};
        use ventora_services::ServiceId;

        let tenant_id = TenantId::new();
        let store_id = StoreId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());
        let projection = StockLevelsProjection::new(InMemoryTenantStore::new());

        seed_store(&projection, tenant_id, store_id, product_id, 5);

        let sale_id = SaleId::new(AggregateId::new());
        let mut sale = Sale::empty(sale_id);
        let now = Utc::now();
        let commands = [
            SaleCommand::Create(CreateSale {
                tenant_id,
                sale_id,
                customer_id: None,
                occurred_at: now,
            }),
            SaleCommand::AddLine(AddSaleLine {
                tenant_id,
                sale_id,
                item: SaleItem::Product(product_id),
                quantity: 2,
                unit_price: 1500,
                discount_bps: 0,
                occurred_at: now,
            }),
            // A service line on the same ticket must leave stock alone.
            SaleCommand::AddLine(AddSaleLine {
                tenant_id,
                sale_id,
                item: SaleItem::Service(ServiceId::new(AggregateId::new())),
                quantity: 1,
                unit_price: 4000,
                discount_bps: 0,
                occurred_at: now,
            }),
            SaleCommand::Confirm(ConfirmSale {
                tenant_id,
                sale_id,
                number: DocumentNumber::render(DocumentKind::Sale, 2026, 1).unwrap(),
                store_id,
                occurred_at: now,
            }),
        ];
        let mut events = Vec::new();
        for cmd in &commands {
            events.extend(execute(&mut sale, cmd).unwrap());
        }
        for env in envelopes_of(tenant_id, sale_id.0, "sales.sale", &events, 1) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.on_hand(tenant_id, &store_id, &product_id), 3);

        let cancelled = execute(
            &mut sale,
            &SaleCommand::Cancel(CancelSale {
                tenant_id,
                sale_id,
                reason: "client refused delivery".to_string(),
                occurred_at: now,
            }),
        )
        .unwrap();
        for env in envelopes_of(
            tenant_id,
            sale_id.0,
            "sales.sale",
            &cancelled,
            1 + events.len() as u64,
        ) {
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.on_hand(tenant_id, &store_id, &product_id), 5);
        let moves = projection.movements(tenant_id, &store_id);
        assert_eq!(moves.last().map(|m| m.kind), Some(StockMovementKind::Return));
    }
}
