//! Expense aggregate.
//!
//! Expenses move through Draft -> Pending -> Approved -> Paid, with Rejected
//! as the refusal branch. Only drafts are editable; approval and payment are
//! recorded with the acting user so the expense report shows who signed off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, PaymentMethod, TenantId,
    UserId,
};
use ventora_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub AggregateId);

impl ExpenseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Pending,
    Approved,
    Paid,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Rent,
    Utilities,
    Salaries,
    Transport,
    Supplies,
    Maintenance,
    Marketing,
    Taxes,
    Other,
}

#[derive(Debug, Clone)]
pub struct Expense {
    pub id: ExpenseId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub category: ExpenseCategory,
    pub amount: u64,
    pub description: String,
    pub supplier: Option<String>,
    pub status: ExpenseStatus,
    pub approved_by: Option<UserId>,
    pub version: u64,
    pub created: bool,
}

impl Expense {
    pub fn empty(id: ExpenseId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            category: ExpenseCategory::Other,
            amount: 0,
            description: String::new(),
            supplier: None,
            status: ExpenseStatus::Draft,
            approved_by: None,
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

impl AggregateRoot for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub number: DocumentNumber,
    pub category: ExpenseCategory,
    pub amount: u64,
    pub description: String,
    pub supplier: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayExpense {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpenseCommand {
    Create(CreateExpense),
    Submit(SubmitExpense),
    Approve(ApproveExpense),
    Reject(RejectExpense),
    Pay(PayExpense),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCreated {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub number: DocumentNumber,
    pub category: ExpenseCategory,
    pub amount: u64,
    pub description: String,
    pub supplier: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseSubmitted {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseApproved {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseRejected {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpensePaid {
    pub tenant_id: TenantId,
    pub expense_id: ExpenseId,
    pub amount: u64,
    pub category: ExpenseCategory,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpenseEvent {
    Created(ExpenseCreated),
    Submitted(ExpenseSubmitted),
    Approved(ExpenseApproved),
    Rejected(ExpenseRejected),
    Paid(ExpensePaid),
}

impl Event for ExpenseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpenseEvent::Created(_) => "expenses.expense.created",
            ExpenseEvent::Submitted(_) => "expenses.expense.submitted",
            ExpenseEvent::Approved(_) => "expenses.expense.approved",
            ExpenseEvent::Rejected(_) => "expenses.expense.rejected",
            ExpenseEvent::Paid(_) => "expenses.expense.paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExpenseEvent::Created(e) => e.occurred_at,
            ExpenseEvent::Submitted(e) => e.occurred_at,
            ExpenseEvent::Approved(e) => e.occurred_at,
            ExpenseEvent::Rejected(e) => e.occurred_at,
            ExpenseEvent::Paid(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Expense {
    type Command = ExpenseCommand;
    type Event = ExpenseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExpenseEvent::Created(e) => {
                self.id = e.expense_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = Some(e.number.clone());
                self.category = e.category;
                self.amount = e.amount;
                self.description = e.description.clone();
                self.supplier = e.supplier.clone();
                self.status = ExpenseStatus::Draft;
                self.created = true;
            }
            ExpenseEvent::Submitted(_) => {
                self.status = ExpenseStatus::Pending;
            }
            ExpenseEvent::Approved(e) => {
                self.status = ExpenseStatus::Approved;
                self.approved_by = Some(e.approved_by);
            }
            ExpenseEvent::Rejected(_) => {
                self.status = ExpenseStatus::Rejected;
            }
            ExpenseEvent::Paid(_) => {
                self.status = ExpenseStatus::Paid;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExpenseCommand::Create(cmd) => self.handle_create(cmd),
            ExpenseCommand::Submit(cmd) => self.handle_submit(cmd),
            ExpenseCommand::Approve(cmd) => self.handle_approve(cmd),
            ExpenseCommand::Reject(cmd) => self.handle_reject(cmd),
            ExpenseCommand::Pay(cmd) => self.handle_pay(cmd),
        }
    }
}

impl Expense {
    fn handle_create(&self, cmd: &CreateExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("expense already created"));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("expense amount must be positive"));
        }
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("expense description is required"));
        }

        Ok(vec![ExpenseEvent::Created(ExpenseCreated {
            tenant_id: cmd.tenant_id,
            expense_id: cmd.expense_id,
            number: cmd.number.clone(),
            category: cmd.category,
            amount: cmd.amount,
            description: cmd.description.trim().to_string(),
            supplier: cmd.supplier.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != ExpenseStatus::Draft {
            return Err(DomainError::invariant(
                "only draft expenses can be submitted",
            ));
        }

        Ok(vec![ExpenseEvent::Submitted(ExpenseSubmitted {
            tenant_id: cmd.tenant_id,
            expense_id: cmd.expense_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != ExpenseStatus::Pending {
            return Err(DomainError::invariant(
                "only pending expenses can be approved",
            ));
        }

        Ok(vec![ExpenseEvent::Approved(ExpenseApproved {
            tenant_id: cmd.tenant_id,
            expense_id: cmd.expense_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != ExpenseStatus::Pending {
            return Err(DomainError::invariant(
                "only pending expenses can be rejected",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }

        Ok(vec![ExpenseEvent::Rejected(ExpenseRejected {
            tenant_id: cmd.tenant_id,
            expense_id: cmd.expense_id,
            rejected_by: cmd.rejected_by,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pay(&self, cmd: &PayExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != ExpenseStatus::Approved {
            return Err(DomainError::invariant("only approved expenses can be paid"));
        }

        Ok(vec![ExpenseEvent::Paid(ExpensePaid {
            tenant_id: cmd.tenant_id,
            expense_id: cmd.expense_id,
            amount: self.amount,
            category: self.category,
            method: cmd.method,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_core::DocumentKind;
    use ventora_events::execute;

    fn draft() -> (Expense, TenantId) {
        let tenant = TenantId::new();
        let id = ExpenseId::new(AggregateId::new());
        let mut expense = Expense::empty(id);
        execute(
            &mut expense,
            &ExpenseCommand::Create(CreateExpense {
                tenant_id: tenant,
                expense_id: id,
                number: DocumentNumber::render(DocumentKind::Expense, 2026, 1).unwrap(),
                category: ExpenseCategory::Rent,
                amount: 150_000,
                description: "September rent".into(),
                supplier: Some("SCI Bellevue".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (expense, tenant)
    }

    fn submit(expense: &mut Expense, tenant: TenantId) {
        let id = expense.id;
        execute(
            expense,
            &ExpenseCommand::Submit(SubmitExpense {
                tenant_id: tenant,
                expense_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn full_workflow_reaches_paid() {
        let (mut expense, tenant) = draft();
        submit(&mut expense, tenant);
        let id = expense.id;
        execute(
            &mut expense,
            &ExpenseCommand::Approve(ApproveExpense {
                tenant_id: tenant,
                expense_id: id,
                approved_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let id = expense.id;
        execute(
            &mut expense,
            &ExpenseCommand::Pay(PayExpense {
                tenant_id: tenant,
                expense_id: id,
                method: PaymentMethod::BankTransfer,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(expense.status, ExpenseStatus::Paid);
        assert!(expense.approved_by.is_some());
    }

    #[test]
    fn draft_expenses_cannot_be_approved_directly() {
        let (expense, tenant) = draft();
        let err = expense
            .handle(&ExpenseCommand::Approve(ApproveExpense {
                tenant_id: tenant,
                expense_id: expense.id,
                approved_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn rejection_requires_a_reason() {
        let (mut expense, tenant) = draft();
        submit(&mut expense, tenant);
        let err = expense
            .handle(&ExpenseCommand::Reject(RejectExpense {
                tenant_id: tenant,
                expense_id: expense.id,
                rejected_by: UserId::new(),
                reason: "  ".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejected_expenses_cannot_be_paid() {
        let (mut expense, tenant) = draft();
        submit(&mut expense, tenant);
        let id = expense.id;
        execute(
            &mut expense,
            &ExpenseCommand::Reject(RejectExpense {
                tenant_id: tenant,
                expense_id: id,
                rejected_by: UserId::new(),
                reason: "no receipt".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let err = expense
            .handle(&ExpenseCommand::Pay(PayExpense {
                tenant_id: tenant,
                expense_id: expense.id,
                method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
