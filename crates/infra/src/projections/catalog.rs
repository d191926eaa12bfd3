//! Product catalog read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_core::TenantId;
use ventora_events::EventEnvelope;
use ventora_products::{ProductEvent, ProductId};

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub min_stock_level: i64,
    pub active: bool,
}

pub struct ProductCatalogProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> ProductCatalogProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("products.catalog"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(tenant_id, product_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.sku.cmp(&b.sku));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "products.product" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, product_id) = match &ev {
            ProductEvent::Registered(e) => (e.tenant_id, e.product_id),
            ProductEvent::DetailsUpdated(e) => (e.tenant_id, e.product_id),
            ProductEvent::PricesUpdated(e) => (e.tenant_id, e.product_id),
            ProductEvent::Deactivated(e) => (e.tenant_id, e.product_id),
            ProductEvent::Reactivated(e) => (e.tenant_id, e.product_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if product_id.0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ProductEvent::Registered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        category: e.category,
                        unit: e.unit,
                        purchase_price: e.purchase_price,
                        selling_price: e.selling_price,
                        min_stock_level: e.min_stock_level,
                        active: true,
                    },
                );
            }
            ProductEvent::DetailsUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.name = e.name;
                    rm.category = e.category;
                    rm.unit = e.unit;
                    rm.min_stock_level = e.min_stock_level;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::PricesUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.purchase_price = e.purchase_price;
                    rm.selling_price = e.selling_price;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::Deactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.active = false;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::Reactivated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.active = true;
                    self.store.upsert(tenant_id, e.product_id, rm);
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
