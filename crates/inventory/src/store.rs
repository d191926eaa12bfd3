//! Store aggregate: one physical location and its on-hand stock.
//!
//! Issues cannot drive on-hand below zero; adjustments can move in either
//! direction but the result must stay non-negative. Returns add stock back
//! with a reference to the document that caused them (e.g. a cancelled sale).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ventora_events::Event;
use ventora_products::ProductId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub AggregateId);

impl StoreId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StoreId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Retail,
    Warehouse,
    Both,
}

#[derive(Debug, Clone)]
pub struct Store {
    pub id: StoreId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub kind: StoreKind,
    pub address: String,
    pub active: bool,
    quantities: HashMap<ProductId, i64>,
    pub version: u64,
    pub created: bool,
}

impl Store {
    pub fn empty(id: StoreId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            kind: StoreKind::Retail,
            address: String::new(),
            active: false,
            quantities: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn on_hand(&self, product_id: ProductId) -> i64 {
        self.quantities.get(&product_id).copied().unwrap_or(0)
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if !self.active {
            return Err(DomainError::invariant("store is closed"));
        }
        Ok(())
    }
}

impl AggregateRoot for Store {
    type Id = StoreId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: String,
    pub kind: StoreKind,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    /// Source document (supplier delivery note, transfer number, ...).
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueStock {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Signed correction applied to on-hand.
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStock {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreCommand {
    Open(OpenStore),
    Update(UpdateStore),
    Close(CloseStore),
    ReceiveStock(ReceiveStock),
    IssueStock(IssueStock),
    AdjustStock(AdjustStock),
    ReturnStock(ReturnStock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOpened {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: String,
    pub kind: StoreKind,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUpdated {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreClosed {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReceived {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockIssued {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReturned {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreEvent {
    Opened(StoreOpened),
    Updated(StoreUpdated),
    Closed(StoreClosed),
    StockReceived(StockReceived),
    StockIssued(StockIssued),
    StockAdjusted(StockAdjusted),
    StockReturned(StockReturned),
}

impl Event for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::Opened(_) => "inventory.store.opened",
            StoreEvent::Updated(_) => "inventory.store.updated",
            StoreEvent::Closed(_) => "inventory.store.closed",
            StoreEvent::StockReceived(_) => "inventory.store.stock_received",
            StoreEvent::StockIssued(_) => "inventory.store.stock_issued",
            StoreEvent::StockAdjusted(_) => "inventory.store.stock_adjusted",
            StoreEvent::StockReturned(_) => "inventory.store.stock_returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StoreEvent::Opened(e) => e.occurred_at,
            StoreEvent::Updated(e) => e.occurred_at,
            StoreEvent::Closed(e) => e.occurred_at,
            StoreEvent::StockReceived(e) => e.occurred_at,
            StoreEvent::StockIssued(e) => e.occurred_at,
            StoreEvent::StockAdjusted(e) => e.occurred_at,
            StoreEvent::StockReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Store {
    type Command = StoreCommand;
    type Event = StoreEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StoreEvent::Opened(e) => {
                self.id = e.store_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.kind = e.kind;
                self.address = e.address.clone();
                self.active = true;
                self.created = true;
            }
            StoreEvent::Updated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
            }
            StoreEvent::Closed(_) => {
                self.active = false;
            }
            StoreEvent::StockReceived(e) => {
                *self.quantities.entry(e.product_id).or_insert(0) += e.quantity as i64;
            }
            StoreEvent::StockIssued(e) => {
                *self.quantities.entry(e.product_id).or_insert(0) -= e.quantity as i64;
            }
            StoreEvent::StockAdjusted(e) => {
                *self.quantities.entry(e.product_id).or_insert(0) += e.delta;
            }
            StoreEvent::StockReturned(e) => {
                *self.quantities.entry(e.product_id).or_insert(0) += e.quantity as i64;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StoreCommand::Open(cmd) => self.handle_open(cmd),
            StoreCommand::Update(cmd) => self.handle_update(cmd),
            StoreCommand::Close(cmd) => self.handle_close(cmd),
            StoreCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StoreCommand::IssueStock(cmd) => self.handle_issue(cmd),
            StoreCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            StoreCommand::ReturnStock(cmd) => self.handle_return(cmd),
        }
    }
}

impl Store {
    fn handle_open(&self, cmd: &OpenStore) -> Result<Vec<StoreEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("store already opened"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("store name cannot be empty"));
        }

        Ok(vec![StoreEvent::Opened(StoreOpened {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            name: cmd.name.trim().to_string(),
            kind: cmd.kind,
            address: cmd.address.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateStore) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("store name cannot be empty"));
        }

        Ok(vec![StoreEvent::Updated(StoreUpdated {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            name: cmd.name.trim().to_string(),
            address: cmd.address.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseStore) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        // A store holding stock cannot be closed; transfer it out first.
        if self.quantities.values().any(|q| *q != 0) {
            return Err(DomainError::invariant("store still holds stock"));
        }

        Ok(vec![StoreEvent::Closed(StoreClosed {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![StoreEvent::StockReceived(StockReceived {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueStock) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let on_hand = self.on_hand(cmd.product_id);
        if (cmd.quantity as i64) > on_hand {
            return Err(DomainError::invariant(format!(
                "insufficient stock: requested {}, on hand {}",
                cmd.quantity, on_hand
            )));
        }

        Ok(vec![StoreEvent::StockIssued(StockIssued {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason is required"));
        }
        let resulting = self.on_hand(cmd.product_id) + cmd.delta;
        if resulting < 0 {
            return Err(DomainError::invariant(
                "adjustment would make stock negative",
            ));
        }

        Ok(vec![StoreEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            delta: cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnStock) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![StoreEvent::StockReturned(StockReturned {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn open_store() -> (Store, TenantId) {
        let tenant = TenantId::new();
        let id = StoreId::new(AggregateId::new());
        let mut store = Store::empty(id);
        execute(
            &mut store,
            &StoreCommand::Open(OpenStore {
                tenant_id: tenant,
                store_id: id,
                name: "Magasin Principal".into(),
                kind: StoreKind::Both,
                address: "Akwa, Douala".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (store, tenant)
    }

    fn receive(store: &mut Store, tenant: TenantId, product: ProductId, qty: u64) {
        let id = store.id;
        execute(
            store,
            &StoreCommand::ReceiveStock(ReceiveStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                quantity: qty,
                reference: "BL-0001".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn receipts_and_issues_track_on_hand() {
        let (mut store, tenant) = open_store();
        let product = ProductId::new(AggregateId::new());
        receive(&mut store, tenant, product, 50);
        assert_eq!(store.on_hand(product), 50);

        let id = store.id;
        execute(
            &mut store,
            &StoreCommand::IssueStock(IssueStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                quantity: 20,
                reference: "VTE2026000001".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(store.on_hand(product), 30);
    }

    #[test]
    fn issue_cannot_exceed_on_hand() {
        let (mut store, tenant) = open_store();
        let product = ProductId::new(AggregateId::new());
        receive(&mut store, tenant, product, 5);

        let err = store
            .handle(&StoreCommand::IssueStock(IssueStock {
                tenant_id: tenant,
                store_id: store.id,
                product_id: product,
                quantity: 6,
                reference: "VTE2026000002".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn adjustment_cannot_go_negative() {
        let (mut store, tenant) = open_store();
        let product = ProductId::new(AggregateId::new());
        receive(&mut store, tenant, product, 10);

        let id = store.id;
        execute(
            &mut store,
            &StoreCommand::AdjustStock(AdjustStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                delta: -4,
                reason: "casse".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(store.on_hand(product), 6);

        let err = store
            .handle(&StoreCommand::AdjustStock(AdjustStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                delta: -7,
                reason: "casse".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn returns_add_stock_back() {
        let (mut store, tenant) = open_store();
        let product = ProductId::new(AggregateId::new());
        receive(&mut store, tenant, product, 10);

        let id = store.id;
        execute(
            &mut store,
            &StoreCommand::IssueStock(IssueStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                quantity: 10,
                reference: "VTE2026000003".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut store,
            &StoreCommand::ReturnStock(ReturnStock {
                tenant_id: tenant,
                store_id: id,
                product_id: product,
                quantity: 10,
                reference: "VTE2026000003".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(store.on_hand(product), 10);
    }

    #[test]
    fn store_with_stock_cannot_close() {
        let (mut store, tenant) = open_store();
        let product = ProductId::new(AggregateId::new());
        receive(&mut store, tenant, product, 1);

        let err = store
            .handle(&StoreCommand::Close(CloseStore {
                tenant_id: tenant,
                store_id: store.id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn closed_store_rejects_movements() {
        let (mut store, tenant) = open_store();
        let id = store.id;
        execute(
            &mut store,
            &StoreCommand::Close(CloseStore {
                tenant_id: tenant,
                store_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = store
            .handle(&StoreCommand::ReceiveStock(ReceiveStock {
                tenant_id: tenant,
                store_id: id,
                product_id: ProductId::new(AggregateId::new()),
                quantity: 1,
                reference: "BL-0002".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
