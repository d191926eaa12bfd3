//! Cash session aggregate.
//!
//! A session is opened by a cashier with a counted opening balance, records
//! cash in/out movements while open, and is closed against a counted closing
//! balance. The expected balance is `opening + inflows - outflows`; the
//! closing event records the difference between counted and expected so
//! shortages show up in the daily report without blocking the close.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, PaymentMethod, TenantId,
    UserId,
};
use ventora_events::Event;
use ventora_inventory::StoreId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CashSessionId(pub AggregateId);

impl CashSessionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CashSessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    In,
    Out,
}

/// What a movement was for. Drives the daily report breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementCategory {
    Sale,
    CustomerPayment,
    SupplierPayment,
    LoanDisbursement,
    LoanRepayment,
    Expense,
    BankDeposit,
    BankWithdrawal,
    Adjustment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashMovement {
    pub number: DocumentNumber,
    pub direction: MovementDirection,
    pub category: MovementCategory,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CashSession {
    pub id: CashSessionId,
    pub tenant_id: Option<TenantId>,
    pub store_id: Option<StoreId>,
    pub cashier_id: Option<UserId>,
    pub status: SessionStatus,
    pub opening_balance: u64,
    pub movements: Vec<CashMovement>,
    pub version: u64,
    pub created: bool,
}

impl CashSession {
    pub fn empty(id: CashSessionId) -> Self {
        Self {
            id,
            tenant_id: None,
            store_id: None,
            cashier_id: None,
            status: SessionStatus::Open,
            opening_balance: 0,
            movements: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Cash the drawer should hold right now.
    pub fn expected_balance(&self) -> u64 {
        let mut balance = self.opening_balance as i128;
        for movement in &self.movements {
            match movement.direction {
                MovementDirection::In => balance += movement.amount as i128,
                MovementDirection::Out => balance -= movement.amount as i128,
            }
        }
        // Outflows are capped at the running balance, so this never goes
        // negative through the command path.
        balance.max(0) as u64
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
        if self.status == SessionStatus::Closed {
            return Err(DomainError::invariant("cash session is closed"));
        }
        Ok(())
    }
}

impl AggregateRoot for CashSession {
    type Id = CashSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSession {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub store_id: StoreId,
    pub cashier_id: UserId,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub number: DocumentNumber,
    pub direction: MovementDirection,
    pub category: MovementCategory,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSession {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub counted_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CashSessionCommand {
    Open(OpenSession),
    RecordMovement(RecordMovement),
    Close(CloseSession),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpened {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub store_id: StoreId,
    pub cashier_id: UserId,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub number: DocumentNumber,
    pub direction: MovementDirection,
    pub category: MovementCategory,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Expected drawer balance after this movement.
    pub balance_after: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosed {
    pub tenant_id: TenantId,
    pub session_id: CashSessionId,
    pub store_id: Option<StoreId>,
    pub cashier_id: Option<UserId>,
    pub expected_balance: u64,
    pub counted_balance: u64,
    /// `counted - expected`. Negative means a shortage.
    pub difference: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CashSessionEvent {
    Opened(SessionOpened),
    MovementRecorded(MovementRecorded),
    Closed(SessionClosed),
}

impl Event for CashSessionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CashSessionEvent::Opened(_) => "cashbox.session.opened",
            CashSessionEvent::MovementRecorded(_) => "cashbox.session.movement_recorded",
            CashSessionEvent::Closed(_) => "cashbox.session.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CashSessionEvent::Opened(e) => e.occurred_at,
            CashSessionEvent::MovementRecorded(e) => e.occurred_at,
            CashSessionEvent::Closed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CashSession {
    type Command = CashSessionCommand;
    type Event = CashSessionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CashSessionEvent::Opened(e) => {
                self.id = e.session_id;
                self.tenant_id = Some(e.tenant_id);
                self.store_id = Some(e.store_id);
                self.cashier_id = Some(e.cashier_id);
                self.opening_balance = e.opening_balance;
                self.status = SessionStatus::Open;
                self.created = true;
            }
            CashSessionEvent::MovementRecorded(e) => {
                self.movements.push(CashMovement {
                    number: e.number.clone(),
                    direction: e.direction,
                    category: e.category,
                    amount: e.amount,
                    method: e.method,
                    reference: e.reference.clone(),
                    recorded_at: e.occurred_at,
                });
            }
            CashSessionEvent::Closed(_) => {
                self.status = SessionStatus::Closed;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CashSessionCommand::Open(cmd) => self.handle_open(cmd),
            CashSessionCommand::RecordMovement(cmd) => self.handle_record(cmd),
            CashSessionCommand::Close(cmd) => self.handle_close(cmd),
        }
    }
}

impl CashSession {
    fn handle_open(&self, cmd: &OpenSession) -> Result<Vec<CashSessionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cash session already opened"));
        }

        Ok(vec![CashSessionEvent::Opened(SessionOpened {
            tenant_id: cmd.tenant_id,
            session_id: cmd.session_id,
            store_id: cmd.store_id,
            cashier_id: cmd.cashier_id,
            opening_balance: cmd.opening_balance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<CashSessionEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("movement amount must be positive"));
        }

        let balance = self.expected_balance();
        let balance_after = match cmd.direction {
            MovementDirection::In => balance.saturating_add(cmd.amount),
            MovementDirection::Out => {
                if cmd.amount > balance {
                    return Err(DomainError::invariant(format!(
                        "outflow of {} exceeds drawer balance {balance}",
                        cmd.amount
                    )));
                }
                balance - cmd.amount
            }
        };

        Ok(vec![CashSessionEvent::MovementRecorded(MovementRecorded {
            tenant_id: cmd.tenant_id,
            session_id: cmd.session_id,
            number: cmd.number.clone(),
            direction: cmd.direction,
            category: cmd.category,
            amount: cmd.amount,
            method: cmd.method,
            reference: cmd.reference.clone(),
            balance_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseSession) -> Result<Vec<CashSessionEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let expected = self.expected_balance();
        let difference = cmd.counted_balance as i64 - expected as i64;

        Ok(vec![CashSessionEvent::Closed(SessionClosed {
            tenant_id: cmd.tenant_id,
            session_id: cmd.session_id,
            store_id: self.store_id,
            cashier_id: self.cashier_id,
            expected_balance: expected,
            counted_balance: cmd.counted_balance,
            difference,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_core::DocumentKind;
    use ventora_events::execute;

    fn opened(opening: u64) -> (CashSession, TenantId) {
        let tenant = TenantId::new();
        let id = CashSessionId::new(AggregateId::new());
        let mut session = CashSession::empty(id);
        execute(
            &mut session,
            &CashSessionCommand::Open(OpenSession {
                tenant_id: tenant,
                session_id: id,
                store_id: StoreId::new(AggregateId::new()),
                cashier_id: UserId::new(),
                opening_balance: opening,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (session, tenant)
    }

    fn movement(
        session: &CashSession,
        tenant: TenantId,
        seq: u64,
        direction: MovementDirection,
        category: MovementCategory,
        amount: u64,
    ) -> CashSessionCommand {
        CashSessionCommand::RecordMovement(RecordMovement {
            tenant_id: tenant,
            session_id: session.id,
            number: DocumentNumber::render(DocumentKind::CashMovement, 2026, seq).unwrap(),
            direction,
            category,
            amount,
            method: PaymentMethod::Cash,
            reference: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn expected_balance_tracks_movements() {
        let (mut session, tenant) = opened(10_000);
        let m1 = movement(
            &session,
            tenant,
            1,
            MovementDirection::In,
            MovementCategory::Sale,
            25_000,
        );
        execute(&mut session, &m1).unwrap();
        let m2 = movement(
            &session,
            tenant,
            2,
            MovementDirection::Out,
            MovementCategory::Expense,
            8_000,
        );
        execute(&mut session, &m2).unwrap();
        assert_eq!(session.expected_balance(), 27_000);
    }

    #[test]
    fn outflow_beyond_drawer_balance_is_rejected() {
        let (session, tenant) = opened(5_000);
        let cmd = movement(
            &session,
            tenant,
            1,
            MovementDirection::Out,
            MovementCategory::BankDeposit,
            5_001,
        );
        let err = session.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn close_records_the_counted_difference() {
        let (mut session, tenant) = opened(10_000);
        let m = movement(
            &session,
            tenant,
            1,
            MovementDirection::In,
            MovementCategory::Sale,
            5_000,
        );
        execute(&mut session, &m).unwrap();

        let id = session.id;
        let events = execute(
            &mut session,
            &CashSessionCommand::Close(CloseSession {
                tenant_id: tenant,
                session_id: id,
                counted_balance: 14_500,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let CashSessionEvent::Closed(closed) = &events[0] else {
            panic!("expected Closed");
        };
        assert_eq!(closed.expected_balance, 15_000);
        assert_eq!(closed.difference, -500);
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[test]
    fn closed_sessions_reject_movements() {
        let (mut session, tenant) = opened(1_000);
        let id = session.id;
        execute(
            &mut session,
            &CashSessionCommand::Close(CloseSession {
                tenant_id: tenant,
                session_id: id,
                counted_balance: 1_000,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let cmd = movement(
            &session,
            tenant,
            1,
            MovementDirection::In,
            MovementCategory::Other,
            100,
        );
        let err = session.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
