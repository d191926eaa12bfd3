//! Sale aggregate (a counter ticket).
//!
//! A ticket mixes product and service lines; only product lines touch
//! stock. Confirmation assigns the year-scoped sale number and names the
//! store the goods leave from; stock availability and customer credit are
//! checked at dispatch time against the read models, not here, because they
//! span other aggregates. Completion marks settlement once the linked
//! invoice is fully paid. Cancellation records the reason and the stock is
//! returned by dispatching return movements to the store.
//!
//! Line discounts are in basis points; a line total is
//! `quantity * unit_price * (10000 - discount_bps) / 10000`, truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, TenantId};
use ventora_customers::CustomerId;
use ventora_events::Event;
use ventora_inventory::StoreId;
use ventora_products::ProductId;
use ventora_services::ServiceId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Draft,
    Confirmed,
    Completed,
    Cancelled,
}

/// What a line sells. Product lines move stock at confirmation and
/// cancellation; service lines never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleItem {
    Product(ProductId),
    Service(ServiceId),
}

impl SaleItem {
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            SaleItem::Product(id) => Some(*id),
            SaleItem::Service(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub item: SaleItem,
    pub quantity: u64,
    pub unit_price: u64,
    pub discount_bps: u32,
}

impl SaleLine {
    pub fn total(&self) -> u64 {
        let gross = self.quantity as u128 * self.unit_price as u128;
        let net = gross * (10_000 - self.discount_bps as u128) / 10_000;
        net as u64
    }
}

#[derive(Debug, Clone)]
pub struct Sale {
    pub id: SaleId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub customer_id: Option<CustomerId>,
    pub store_id: Option<StoreId>,
    pub status: SaleStatus,
    pub lines: Vec<SaleLine>,
    pub version: u64,
    pub created: bool,
}

impl Sale {
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            customer_id: None,
            store_id: None,
            status: SaleStatus::Draft,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn total(&self) -> u64 {
        self.lines.iter().map(|l| l.total()).sum()
    }

    pub fn is_modifiable(&self) -> bool {
        self.status == SaleStatus::Draft
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    /// Anonymous counter sales carry no customer.
    pub customer_id: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSaleLine {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub item: SaleItem,
    pub quantity: u64,
    pub unit_price: u64,
    pub discount_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSaleLine {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub number: DocumentNumber,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Settlement of the sale, driven by the invoicing saga once the linked
/// invoice is fully paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SaleCommand {
    Create(CreateSale),
    AddLine(AddSaleLine),
    RemoveLine(RemoveSaleLine),
    Confirm(ConfirmSale),
    Complete(CompleteSale),
    Cancel(CancelSale),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleCreated {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub customer_id: Option<CustomerId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineAdded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub item: SaleItem,
    pub quantity: u64,
    pub unit_price: u64,
    pub discount_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineRemoved {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleConfirmed {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub number: DocumentNumber,
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    /// Snapshot of the lines at confirmation, for downstream consumers.
    pub lines: Vec<SaleLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleCancelled {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: String,
    /// Set when the sale was already confirmed, so stock can be returned.
    pub store_id: Option<StoreId>,
    pub lines: Vec<SaleLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleCompleted {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SaleEvent {
    Created(SaleCreated),
    LineAdded(SaleLineAdded),
    LineRemoved(SaleLineRemoved),
    Confirmed(SaleConfirmed),
    Completed(SaleCompleted),
    Cancelled(SaleCancelled),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::Created(_) => "sales.sale.created",
            SaleEvent::LineAdded(_) => "sales.sale.line_added",
            SaleEvent::LineRemoved(_) => "sales.sale.line_removed",
            SaleEvent::Confirmed(_) => "sales.sale.confirmed",
            SaleEvent::Completed(_) => "sales.sale.completed",
            SaleEvent::Cancelled(_) => "sales.sale.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::Created(e) => e.occurred_at,
            SaleEvent::LineAdded(e) => e.occurred_at,
            SaleEvent::LineRemoved(e) => e.occurred_at,
            SaleEvent::Confirmed(e) => e.occurred_at,
            SaleEvent::Completed(e) => e.occurred_at,
            SaleEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::Created(e) => {
                self.id = e.sale_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = e.customer_id;
                self.status = SaleStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            SaleEvent::LineAdded(e) => {
                self.lines.push(SaleLine {
                    line_no: e.line_no,
                    item: e.item,
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                    discount_bps: e.discount_bps,
                });
            }
            SaleEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
            }
            SaleEvent::Confirmed(e) => {
                self.number = Some(e.number.clone());
                self.store_id = Some(e.store_id);
                self.status = SaleStatus::Confirmed;
            }
            SaleEvent::Completed(_) => {
                self.status = SaleStatus::Completed;
            }
            SaleEvent::Cancelled(_) => {
                self.status = SaleStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::Create(cmd) => self.handle_create(cmd),
            SaleCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SaleCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            SaleCommand::Confirm(cmd) => self.handle_confirm(cmd),
            SaleCommand::Complete(cmd) => self.handle_complete(cmd),
            SaleCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Sale {
    fn handle_create(&self, cmd: &CreateSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }

        Ok(vec![SaleEvent::Created(SaleCreated {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddSaleLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "confirmed or cancelled sales cannot be modified",
            ));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }
        if cmd.discount_bps > 10_000 {
            return Err(DomainError::validation("discount cannot exceed 100%"));
        }

        let next_line_no = self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;

        Ok(vec![SaleEvent::LineAdded(SaleLineAdded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            line_no: next_line_no,
            item: cmd.item,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            discount_bps: cmd.discount_bps,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveSaleLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "confirmed or cancelled sales cannot be modified",
            ));
        }
        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::not_found());
        }

        Ok(vec![SaleEvent::LineRemoved(SaleLineRemoved {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != SaleStatus::Draft {
            return Err(DomainError::invariant("only draft sales can be confirmed"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm a sale without lines"));
        }

        Ok(vec![SaleEvent::Confirmed(SaleConfirmed {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            number: cmd.number.clone(),
            store_id: cmd.store_id,
            customer_id: self.customer_id,
            total: self.total(),
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == SaleStatus::Completed {
            return Err(DomainError::conflict("sale already completed"));
        }
        if self.status != SaleStatus::Confirmed {
            return Err(DomainError::invariant("only confirmed sales can be completed"));
        }

        Ok(vec![SaleEvent::Completed(SaleCompleted {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        match self.status {
            SaleStatus::Draft | SaleStatus::Confirmed | SaleStatus::Completed => {}
            SaleStatus::Cancelled => {
                return Err(DomainError::conflict("sale already cancelled"));
            }
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }

        Ok(vec![SaleEvent::Cancelled(SaleCancelled {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            reason: cmd.reason.clone(),
            store_id: self.store_id,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_core::DocumentKind;
    use ventora_events::execute;

    fn draft_sale_with_lines() -> (Sale, TenantId) {
        let tenant = TenantId::new();
        let id = SaleId::new(AggregateId::new());
        let mut sale = Sale::empty(id);
        execute(
            &mut sale,
            &SaleCommand::Create(CreateSale {
                tenant_id: tenant,
                sale_id: id,
                customer_id: Some(CustomerId::new(AggregateId::new())),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut sale,
            &SaleCommand::AddLine(AddSaleLine {
                tenant_id: tenant,
                sale_id: id,
                item: SaleItem::Product(ProductId::new(AggregateId::new())),
                quantity: 3,
                unit_price: 500,
                discount_bps: 0,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut sale,
            &SaleCommand::AddLine(AddSaleLine {
                tenant_id: tenant,
                sale_id: id,
                item: SaleItem::Product(ProductId::new(AggregateId::new())),
                quantity: 2,
                unit_price: 1_000,
                discount_bps: 1_000, // 10% off
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (sale, tenant)
    }

    #[test]
    fn line_totals_apply_discounts() {
        let (sale, _) = draft_sale_with_lines();
        // 3*500 = 1500; 2*1000 minus 10% = 1800.
        assert_eq!(sale.total(), 3_300);
    }

    #[test]
    fn discount_truncates_toward_zero() {
        let line = SaleLine {
            line_no: 1,
            item: SaleItem::Product(ProductId::new(AggregateId::new())),
            quantity: 1,
            unit_price: 999,
            discount_bps: 333, // 3.33%
        };
        // 999 * 0.9667 = 965.7333..., truncated.
        assert_eq!(line.total(), 965);
    }

    #[test]
    fn confirmation_snapshots_lines_and_total() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;
        let number = DocumentNumber::render(DocumentKind::Sale, 2026, 42).unwrap();
        let store = StoreId::new(AggregateId::new());
        let events = execute(
            &mut sale,
            &SaleCommand::Confirm(ConfirmSale {
                tenant_id: tenant,
                sale_id: id,
                number: number.clone(),
                store_id: store,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        match &events[0] {
            SaleEvent::Confirmed(e) => {
                assert_eq!(e.number, number);
                assert_eq!(e.total, 3_300);
                assert_eq!(e.lines.len(), 2);
                assert_eq!(e.store_id, store);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(sale.status, SaleStatus::Confirmed);
        assert_eq!(sale.number, Some(number));
    }

    #[test]
    fn confirmed_sale_cannot_gain_lines() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;
        execute(
            &mut sale,
            &SaleCommand::Confirm(ConfirmSale {
                tenant_id: tenant,
                sale_id: id,
                number: DocumentNumber::render(DocumentKind::Sale, 2026, 43).unwrap(),
                store_id: StoreId::new(AggregateId::new()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = sale
            .handle(&SaleCommand::AddLine(AddSaleLine {
                tenant_id: tenant,
                sale_id: id,
                item: SaleItem::Product(ProductId::new(AggregateId::new())),
                quantity: 1,
                unit_price: 100,
                discount_bps: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancelling_a_confirmed_sale_carries_store_and_lines() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;
        let store = StoreId::new(AggregateId::new());
        execute(
            &mut sale,
            &SaleCommand::Confirm(ConfirmSale {
                tenant_id: tenant,
                sale_id: id,
                number: DocumentNumber::render(DocumentKind::Sale, 2026, 44).unwrap(),
                store_id: store,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let events = execute(
            &mut sale,
            &SaleCommand::Cancel(CancelSale {
                tenant_id: tenant,
                sale_id: id,
                reason: "client refused delivery".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        match &events[0] {
            SaleEvent::Cancelled(e) => {
                assert_eq!(e.store_id, Some(store));
                assert_eq!(e.lines.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn only_confirmed_sales_can_be_completed() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;

        let err = sale
            .handle(&SaleCommand::Complete(CompleteSale {
                tenant_id: tenant,
                sale_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        execute(
            &mut sale,
            &SaleCommand::Confirm(ConfirmSale {
                tenant_id: tenant,
                sale_id: id,
                number: DocumentNumber::render(DocumentKind::Sale, 2026, 45).unwrap(),
                store_id: StoreId::new(AggregateId::new()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut sale,
            &SaleCommand::Complete(CompleteSale {
                tenant_id: tenant,
                sale_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);

        // Settled twice is a replay, surfaced as a conflict so callers can
        // tell it apart from a state-machine violation.
        let err = sale
            .handle(&SaleCommand::Complete(CompleteSale {
                tenant_id: tenant,
                sale_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        // A completed sale can still be annulled.
        let events = execute(
            &mut sale,
            &SaleCommand::Cancel(CancelSale {
                tenant_id: tenant,
                sale_id: id,
                reason: "post-settlement return".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(matches!(events[0], SaleEvent::Cancelled(_)));
    }

    #[test]
    fn service_lines_price_like_product_lines_but_carry_no_product() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;
        execute(
            &mut sale,
            &SaleCommand::AddLine(AddSaleLine {
                tenant_id: tenant,
                sale_id: id,
                item: SaleItem::Service(ServiceId::new(AggregateId::new())),
                quantity: 1,
                unit_price: 2_000,
                discount_bps: 500, // 5% off
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let line = &sale.lines[2];
        assert_eq!(line.total(), 1_900);
        assert_eq!(line.item.product_id(), None);
        assert_eq!(sale.total(), 5_200);
    }

    #[test]
    fn removing_a_line_renumbers_nothing() {
        let (mut sale, tenant) = draft_sale_with_lines();
        let id = sale.id;
        execute(
            &mut sale,
            &SaleCommand::RemoveLine(RemoveSaleLine {
                tenant_id: tenant,
                sale_id: id,
                line_no: 1,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.lines[0].line_no, 2);

        // Next line gets a fresh number, not a reused one.
        execute(
            &mut sale,
            &SaleCommand::AddLine(AddSaleLine {
                tenant_id: tenant,
                sale_id: id,
                item: SaleItem::Product(ProductId::new(AggregateId::new())),
                quantity: 1,
                unit_price: 100,
                discount_bps: 0,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(sale.lines[1].line_no, 3);
    }
}
