//! Stock transfer aggregate (moving goods between stores).
//!
//! Lifecycle: Draft -> Pending -> InTransit -> Received, with cancellation
//! possible until validation. Validation assigns the transfer number and
//! freezes the sent quantities; the receiving side records what actually
//! arrived, which may be less than what was sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, TenantId};
use ventora_events::Event;
use ventora_products::ProductId;

use crate::store::StoreId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Pending,
    InTransit,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    pub quantity_requested: u64,
    pub quantity_sent: u64,
    pub quantity_received: u64,
}

#[derive(Debug, Clone)]
pub struct StockTransfer {
    pub id: TransferId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub from_store: Option<StoreId>,
    pub to_store: Option<StoreId>,
    pub status: TransferStatus,
    pub lines: Vec<TransferLine>,
    pub version: u64,
    pub created: bool,
}

impl StockTransfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            from_store: None,
            to_store: None,
            status: TransferStatus::Draft,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
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

impl AggregateRoot for StockTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from_store: StoreId,
    pub to_store: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTransferLine {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Dispatch approval: assigns the number and marks goods as in transit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: DocumentNumber,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub received: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StockTransferCommand {
    Create(CreateTransfer),
    AddLine(AddTransferLine),
    Submit(SubmitTransfer),
    Validate(ValidateTransfer),
    Receive(ReceiveTransfer),
    Cancel(CancelTransfer),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCreated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from_store: StoreId,
    pub to_store: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLineAdded {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSubmitted {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferValidated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: DocumentNumber,
    pub from_store: StoreId,
    pub to_store: StoreId,
    /// Quantities frozen at dispatch, per line.
    pub sent: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub received: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StockTransferEvent {
    Created(TransferCreated),
    LineAdded(TransferLineAdded),
    Submitted(TransferSubmitted),
    Validated(TransferValidated),
    Received(TransferReceived),
    Cancelled(TransferCancelled),
}

impl Event for StockTransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockTransferEvent::Created(_) => "inventory.transfer.created",
            StockTransferEvent::LineAdded(_) => "inventory.transfer.line_added",
            StockTransferEvent::Submitted(_) => "inventory.transfer.submitted",
            StockTransferEvent::Validated(_) => "inventory.transfer.validated",
            StockTransferEvent::Received(_) => "inventory.transfer.received",
            StockTransferEvent::Cancelled(_) => "inventory.transfer.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockTransferEvent::Created(e) => e.occurred_at,
            StockTransferEvent::LineAdded(e) => e.occurred_at,
            StockTransferEvent::Submitted(e) => e.occurred_at,
            StockTransferEvent::Validated(e) => e.occurred_at,
            StockTransferEvent::Received(e) => e.occurred_at,
            StockTransferEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockTransfer {
    type Command = StockTransferCommand;
    type Event = StockTransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockTransferEvent::Created(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.from_store = Some(e.from_store);
                self.to_store = Some(e.to_store);
                self.status = TransferStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            StockTransferEvent::LineAdded(e) => {
                self.lines.push(TransferLine {
                    product_id: e.product_id,
                    quantity_requested: e.quantity,
                    quantity_sent: 0,
                    quantity_received: 0,
                });
            }
            StockTransferEvent::Submitted(_) => {
                self.status = TransferStatus::Pending;
            }
            StockTransferEvent::Validated(e) => {
                self.number = Some(e.number.clone());
                for sent in &e.sent {
                    if let Some(line) = self
                        .lines
                        .iter_mut()
                        .find(|l| l.product_id == sent.product_id)
                    {
                        line.quantity_sent = sent.quantity;
                    }
                }
                self.status = TransferStatus::InTransit;
            }
            StockTransferEvent::Received(e) => {
                for rec in &e.received {
                    if let Some(line) = self
                        .lines
                        .iter_mut()
                        .find(|l| l.product_id == rec.product_id)
                    {
                        line.quantity_received = rec.quantity;
                    }
                }
                self.status = TransferStatus::Received;
            }
            StockTransferEvent::Cancelled(_) => {
                self.status = TransferStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockTransferCommand::Create(cmd) => self.handle_create(cmd),
            StockTransferCommand::AddLine(cmd) => self.handle_add_line(cmd),
            StockTransferCommand::Submit(cmd) => self.handle_submit(cmd),
            StockTransferCommand::Validate(cmd) => self.handle_validate(cmd),
            StockTransferCommand::Receive(cmd) => self.handle_receive(cmd),
            StockTransferCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl StockTransfer {
    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.from_store == cmd.to_store {
            return Err(DomainError::validation(
                "source and destination stores must differ",
            ));
        }

        Ok(vec![StockTransferEvent::Created(TransferCreated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            from_store: cmd.from_store,
            to_store: cmd.to_store,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddTransferLine) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != TransferStatus::Draft {
            return Err(DomainError::invariant("transfer is no longer editable"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.lines.iter().any(|l| l.product_id == cmd.product_id) {
            return Err(DomainError::invariant("product already on this transfer"));
        }

        Ok(vec![StockTransferEvent::LineAdded(TransferLineAdded {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != TransferStatus::Draft {
            return Err(DomainError::invariant("only draft transfers can be submitted"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot submit an empty transfer"));
        }

        Ok(vec![StockTransferEvent::Submitted(TransferSubmitted {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_validate(&self, cmd: &ValidateTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != TransferStatus::Pending {
            return Err(DomainError::invariant(
                "only pending transfers can be validated",
            ));
        }
        let (from_store, to_store) = match (self.from_store, self.to_store) {
            (Some(f), Some(t)) => (f, t),
            _ => return Err(DomainError::invariant("transfer has no stores")),
        };

        let sent = self
            .lines
            .iter()
            .map(|l| ReceivedLine {
                product_id: l.product_id,
                quantity: l.quantity_requested,
            })
            .collect();

        Ok(vec![StockTransferEvent::Validated(TransferValidated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            number: cmd.number.clone(),
            from_store,
            to_store,
            sent,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != TransferStatus::InTransit {
            return Err(DomainError::invariant(
                "only in-transit transfers can be received",
            ));
        }
        for rec in &cmd.received {
            let line = self
                .lines
                .iter()
                .find(|l| l.product_id == rec.product_id)
                .ok_or_else(|| DomainError::validation("received product not on transfer"))?;
            if rec.quantity > line.quantity_sent {
                return Err(DomainError::invariant(
                    "cannot receive more than was sent",
                ));
            }
        }

        Ok(vec![StockTransferEvent::Received(TransferReceived {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            received: cmd.received.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        match self.status {
            TransferStatus::Draft | TransferStatus::Pending => {}
            _ => {
                return Err(DomainError::invariant(
                    "transfer can no longer be cancelled",
                ));
            }
        }

        Ok(vec![StockTransferEvent::Cancelled(TransferCancelled {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
