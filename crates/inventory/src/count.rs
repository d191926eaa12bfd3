//! Physical inventory count aggregate.
//!
//! Lifecycle: Draft -> InProgress -> Completed -> Validated, cancellable
//! until validated. Validation computes discrepancies (counted minus
//! theoretical); applying them to the store is done by dispatching
//! adjustments, not by this aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, TenantId};
use ventora_events::Event;
use ventora_products::ProductId;

use crate::store::StoreId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountId(pub AggregateId);

impl CountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Draft,
    InProgress,
    Completed,
    Validated,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub product_id: ProductId,
    pub theoretical: i64,
    pub counted: i64,
}

impl CountLine {
    pub fn discrepancy(&self) -> i64 {
        self.counted - self.theoretical
    }
}

#[derive(Debug, Clone)]
pub struct InventoryCount {
    pub id: CountId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub store_id: Option<StoreId>,
    pub status: CountStatus,
    pub lines: Vec<CountLine>,
    pub version: u64,
    pub created: bool,
}

impl InventoryCount {
    pub fn empty(id: CountId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            store_id: None,
            status: CountStatus::Draft,
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

impl AggregateRoot for InventoryCount {
    type Id = CountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCount {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub store_id: StoreId,
    pub number: DocumentNumber,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginCount {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub occurred_at: DateTime<Utc>,
}

/// Upserts the line for a product; counting the same shelf twice replaces
/// the earlier figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCountLine {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub product_id: ProductId,
    pub theoretical: i64,
    pub counted: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCount {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateCount {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelCount {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InventoryCountCommand {
    Create(CreateCount),
    Begin(BeginCount),
    RecordLine(RecordCountLine),
    Complete(CompleteCount),
    Validate(ValidateCount),
    Cancel(CancelCount),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCreated {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub store_id: StoreId,
    pub number: DocumentNumber,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountStarted {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountLineRecorded {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub product_id: ProductId,
    pub theoretical: i64,
    pub counted: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCompleted {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountDiscrepancy {
    pub product_id: ProductId,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountValidated {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub store_id: StoreId,
    /// Non-zero discrepancies only; the adjustments to apply.
    pub discrepancies: Vec<CountDiscrepancy>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCancelled {
    pub tenant_id: TenantId,
    pub count_id: CountId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InventoryCountEvent {
    Created(CountCreated),
    Started(CountStarted),
    LineRecorded(CountLineRecorded),
    Completed(CountCompleted),
    Validated(CountValidated),
    Cancelled(CountCancelled),
}

impl Event for InventoryCountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryCountEvent::Created(_) => "inventory.count.created",
            InventoryCountEvent::Started(_) => "inventory.count.started",
            InventoryCountEvent::LineRecorded(_) => "inventory.count.line_recorded",
            InventoryCountEvent::Completed(_) => "inventory.count.completed",
            InventoryCountEvent::Validated(_) => "inventory.count.validated",
            InventoryCountEvent::Cancelled(_) => "inventory.count.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryCountEvent::Created(e) => e.occurred_at,
            InventoryCountEvent::Started(e) => e.occurred_at,
            InventoryCountEvent::LineRecorded(e) => e.occurred_at,
            InventoryCountEvent::Completed(e) => e.occurred_at,
            InventoryCountEvent::Validated(e) => e.occurred_at,
            InventoryCountEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryCount {
    type Command = InventoryCountCommand;
    type Event = InventoryCountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryCountEvent::Created(e) => {
                self.id = e.count_id;
                self.tenant_id = Some(e.tenant_id);
                self.store_id = Some(e.store_id);
                self.number = Some(e.number.clone());
                self.status = CountStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            InventoryCountEvent::Started(_) => {
                self.status = CountStatus::InProgress;
            }
            InventoryCountEvent::LineRecorded(e) => {
                if let Some(line) = self
                    .lines
                    .iter_mut()
                    .find(|l| l.product_id == e.product_id)
                {
                    line.theoretical = e.theoretical;
                    line.counted = e.counted;
                } else {
                    self.lines.push(CountLine {
                        product_id: e.product_id,
                        theoretical: e.theoretical,
                        counted: e.counted,
                    });
                }
            }
            InventoryCountEvent::Completed(_) => {
                self.status = CountStatus::Completed;
            }
            InventoryCountEvent::Validated(_) => {
                self.status = CountStatus::Validated;
            }
            InventoryCountEvent::Cancelled(_) => {
                self.status = CountStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCountCommand::Create(cmd) => self.handle_create(cmd),
            InventoryCountCommand::Begin(cmd) => self.handle_begin(cmd),
            InventoryCountCommand::RecordLine(cmd) => self.handle_record_line(cmd),
            InventoryCountCommand::Complete(cmd) => self.handle_complete(cmd),
            InventoryCountCommand::Validate(cmd) => self.handle_validate(cmd),
            InventoryCountCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl InventoryCount {
    fn handle_create(&self, cmd: &CreateCount) -> Result<Vec<InventoryCountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("count already exists"));
        }

        Ok(vec![InventoryCountEvent::Created(CountCreated {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            store_id: cmd.store_id,
            number: cmd.number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_begin(&self, cmd: &BeginCount) -> Result<Vec<InventoryCountEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != CountStatus::Draft {
            return Err(DomainError::invariant("only draft counts can begin"));
        }

        Ok(vec![InventoryCountEvent::Started(CountStarted {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_line(
        &self,
        cmd: &RecordCountLine,
    ) -> Result<Vec<InventoryCountEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != CountStatus::InProgress {
            return Err(DomainError::invariant(
                "lines can only be recorded while counting is in progress",
            ));
        }
        if cmd.counted < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }

        Ok(vec![InventoryCountEvent::LineRecorded(CountLineRecorded {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            product_id: cmd.product_id,
            theoretical: cmd.theoretical,
            counted: cmd.counted,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteCount) -> Result<Vec<InventoryCountEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != CountStatus::InProgress {
            return Err(DomainError::invariant(
                "only in-progress counts can be completed",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot complete an empty count"));
        }

        Ok(vec![InventoryCountEvent::Completed(CountCompleted {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_validate(&self, cmd: &ValidateCount) -> Result<Vec<InventoryCountEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != CountStatus::Completed {
            return Err(DomainError::invariant(
                "only completed counts can be validated",
            ));
        }
        let store_id = self
            .store_id
            .ok_or_else(|| DomainError::invariant("count has no store"))?;

        let discrepancies = self
            .lines
            .iter()
            .filter(|l| l.discrepancy() != 0)
            .map(|l| CountDiscrepancy {
                product_id: l.product_id,
                delta: l.discrepancy(),
            })
            .collect();

        Ok(vec![InventoryCountEvent::Validated(CountValidated {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            store_id,
            discrepancies,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelCount) -> Result<Vec<InventoryCountEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        match self.status {
            CountStatus::Validated => {
                return Err(DomainError::invariant("validated counts cannot be cancelled"));
            }
            CountStatus::Cancelled => {
                return Err(DomainError::invariant("count already cancelled"));
            }
            _ => {}
        }

        Ok(vec![InventoryCountEvent::Cancelled(CountCancelled {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
