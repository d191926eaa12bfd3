//! Loan aggregate.
//!
//! Loans taken by the business, either from a bank or from an individual.
//! Bank loans accrue simple interest pro-rated over the term in months;
//! other lenders charge a flat percentage of the principal regardless of
//! term. Repayments reduce the balance until the loan is settled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, PaymentMethod, TenantId,
};
use ventora_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub AggregateId);

impl LoanId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LoanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Paid,
    Defaulted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanSource {
    Bank,
    Other,
}

/// Total interest in XAF for a loan of `principal` at `annual_rate_bps`
/// over `term_months`.
///
/// Banks charge simple interest pro-rated to the term
/// (`principal * rate * months / 12`); individual lenders charge a flat
/// share of the principal. Division truncates.
pub fn total_interest(
    source: LoanSource,
    principal: u64,
    annual_rate_bps: u32,
    term_months: u32,
) -> u64 {
    let p = principal as u128;
    let r = annual_rate_bps as u128;
    let interest = match source {
        LoanSource::Bank => p * r * term_months as u128 / (10_000 * 12),
        LoanSource::Other => p * r / 10_000,
    };
    interest as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repayment {
    pub amount: u64,
    pub method: PaymentMethod,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Loan {
    pub id: LoanId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub lender: String,
    pub source: LoanSource,
    pub principal: u64,
    pub annual_rate_bps: u32,
    pub term_months: u32,
    pub total_due: u64,
    pub repaid: u64,
    pub status: LoanStatus,
    pub repayments: Vec<Repayment>,
    pub version: u64,
    pub created: bool,
}

impl Loan {
    pub fn empty(id: LoanId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            lender: String::new(),
            source: LoanSource::Other,
            principal: 0,
            annual_rate_bps: 0,
            term_months: 0,
            total_due: 0,
            repaid: 0,
            status: LoanStatus::Active,
            repayments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn balance(&self) -> u64 {
        self.total_due.saturating_sub(self.repaid)
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.status != LoanStatus::Active {
            return Err(DomainError::invariant("loan is not active"));
        }
        Ok(())
    }
}

impl AggregateRoot for Loan {
    type Id = LoanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub number: DocumentNumber,
    pub lender: String,
    pub source: LoanSource,
    pub principal: u64,
    pub annual_rate_bps: u32,
    pub term_months: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRepayment {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkDefaulted {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelLoan {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoanCommand {
    Grant(GrantLoan),
    RecordRepayment(RecordRepayment),
    MarkDefaulted(MarkDefaulted),
    Cancel(CancelLoan),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanGranted {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub number: DocumentNumber,
    pub lender: String,
    pub source: LoanSource,
    pub principal: u64,
    pub annual_rate_bps: u32,
    pub term_months: u32,
    /// Principal plus all interest, fixed at grant time.
    pub total_due: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentRecorded {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub amount: u64,
    pub method: PaymentMethod,
    /// Outstanding balance after this repayment.
    pub balance_after: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSettled {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub total_repaid: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDefaulted {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub outstanding: u64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanCancelled {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoanEvent {
    Granted(LoanGranted),
    RepaymentRecorded(RepaymentRecorded),
    Settled(LoanSettled),
    Defaulted(LoanDefaulted),
    Cancelled(LoanCancelled),
}

impl Event for LoanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::Granted(_) => "loans.loan.granted",
            LoanEvent::RepaymentRecorded(_) => "loans.loan.repayment_recorded",
            LoanEvent::Settled(_) => "loans.loan.settled",
            LoanEvent::Defaulted(_) => "loans.loan.defaulted",
            LoanEvent::Cancelled(_) => "loans.loan.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LoanEvent::Granted(e) => e.occurred_at,
            LoanEvent::RepaymentRecorded(e) => e.occurred_at,
            LoanEvent::Settled(e) => e.occurred_at,
            LoanEvent::Defaulted(e) => e.occurred_at,
            LoanEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Loan {
    type Command = LoanCommand;
    type Event = LoanEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LoanEvent::Granted(e) => {
                self.id = e.loan_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = Some(e.number.clone());
                self.lender = e.lender.clone();
                self.source = e.source;
                self.principal = e.principal;
                self.annual_rate_bps = e.annual_rate_bps;
                self.term_months = e.term_months;
                self.total_due = e.total_due;
                self.status = LoanStatus::Active;
                self.created = true;
            }
            LoanEvent::RepaymentRecorded(e) => {
                self.repayments.push(Repayment {
                    amount: e.amount,
                    method: e.method,
                    received_at: e.occurred_at,
                });
                self.repaid = self.total_due.saturating_sub(e.balance_after);
            }
            LoanEvent::Settled(_) => {
                self.status = LoanStatus::Paid;
            }
            LoanEvent::Defaulted(_) => {
                self.status = LoanStatus::Defaulted;
            }
            LoanEvent::Cancelled(_) => {
                self.status = LoanStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LoanCommand::Grant(cmd) => self.handle_grant(cmd),
            LoanCommand::RecordRepayment(cmd) => self.handle_repayment(cmd),
            LoanCommand::MarkDefaulted(cmd) => self.handle_default(cmd),
            LoanCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Loan {
    fn handle_grant(&self, cmd: &GrantLoan) -> Result<Vec<LoanEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("loan already granted"));
        }
        if cmd.principal == 0 {
            return Err(DomainError::validation("loan principal must be positive"));
        }
        if cmd.lender.trim().is_empty() {
            return Err(DomainError::validation("lender name is required"));
        }
        if cmd.source == LoanSource::Bank && cmd.term_months == 0 {
            return Err(DomainError::validation(
                "bank loans need a term of at least one month",
            ));
        }

        let interest = total_interest(
            cmd.source,
            cmd.principal,
            cmd.annual_rate_bps,
            cmd.term_months,
        );
        let total_due = cmd
            .principal
            .checked_add(interest)
            .ok_or_else(|| DomainError::validation("loan total overflows"))?;

        Ok(vec![LoanEvent::Granted(LoanGranted {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            number: cmd.number.clone(),
            lender: cmd.lender.trim().to_string(),
            source: cmd.source,
            principal: cmd.principal,
            annual_rate_bps: cmd.annual_rate_bps,
            term_months: cmd.term_months,
            total_due,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_repayment(&self, cmd: &RecordRepayment) -> Result<Vec<LoanEvent>, DomainError> {
        self.ensure_active()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("repayment amount must be positive"));
        }
        let balance = self.balance();
        if cmd.amount > balance {
            return Err(DomainError::invariant(format!(
                "repayment of {} exceeds balance {balance}",
                cmd.amount
            )));
        }

        let balance_after = balance - cmd.amount;
        let mut events = vec![LoanEvent::RepaymentRecorded(RepaymentRecorded {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            amount: cmd.amount,
            method: cmd.method,
            balance_after,
            occurred_at: cmd.occurred_at,
        })];

        if balance_after == 0 {
            events.push(LoanEvent::Settled(LoanSettled {
                tenant_id: cmd.tenant_id,
                loan_id: cmd.loan_id,
                total_repaid: self.total_due,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_default(&self, cmd: &MarkDefaulted) -> Result<Vec<LoanEvent>, DomainError> {
        self.ensure_active()?;
        self.ensure_tenant(cmd.tenant_id)?;

        Ok(vec![LoanEvent::Defaulted(LoanDefaulted {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            outstanding: self.balance(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelLoan) -> Result<Vec<LoanEvent>, DomainError> {
        self.ensure_active()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.repayments.is_empty() {
            return Err(DomainError::invariant(
                "loans with repayments cannot be cancelled",
            ));
        }

        Ok(vec![LoanEvent::Cancelled(LoanCancelled {
            tenant_id: cmd.tenant_id,
            loan_id: cmd.loan_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_core::DocumentKind;
    use ventora_events::execute;

    fn granted(source: LoanSource, principal: u64, rate_bps: u32, months: u32) -> (Loan, TenantId) {
        let tenant = TenantId::new();
        let id = LoanId::new(AggregateId::new());
        let mut loan = Loan::empty(id);
        execute(
            &mut loan,
            &LoanCommand::Grant(GrantLoan {
                tenant_id: tenant,
                loan_id: id,
                number: DocumentNumber::render(DocumentKind::Loan, 2026, 1).unwrap(),
                lender: "Afriland First Bank".into(),
                source,
                principal,
                annual_rate_bps: rate_bps,
                term_months: months,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (loan, tenant)
    }

    #[test]
    fn bank_interest_is_prorated_over_the_term() {
        // 1_000_000 at 12% over 6 months -> 60_000 interest.
        assert_eq!(total_interest(LoanSource::Bank, 1_000_000, 1_200, 6), 60_000);
    }

    #[test]
    fn individual_lenders_charge_flat_interest() {
        // 500_000 at 10% flat -> 50_000 regardless of term.
        assert_eq!(total_interest(LoanSource::Other, 500_000, 1_000, 3), 50_000);
        assert_eq!(
            total_interest(LoanSource::Other, 500_000, 1_000, 24),
            50_000
        );
    }

    #[test]
    fn full_repayment_settles_the_loan() {
        let (mut loan, tenant) = granted(LoanSource::Bank, 1_000_000, 1_200, 6);
        assert_eq!(loan.total_due, 1_060_000);

        let id = loan.id;
        let events = execute(
            &mut loan,
            &LoanCommand::RecordRepayment(RecordRepayment {
                tenant_id: tenant,
                loan_id: id,
                amount: 1_060_000,
                method: PaymentMethod::BankTransfer,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], LoanEvent::Settled(_)));
        assert_eq!(loan.status, LoanStatus::Paid);
        assert_eq!(loan.balance(), 0);
    }

    #[test]
    fn repayment_beyond_balance_is_rejected() {
        let (loan, tenant) = granted(LoanSource::Other, 100_000, 500, 0);
        let err = loan
            .handle(&LoanCommand::RecordRepayment(RecordRepayment {
                tenant_id: tenant,
                loan_id: loan.id,
                amount: 105_001,
                method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancellation_requires_no_repayments() {
        let (mut loan, tenant) = granted(LoanSource::Other, 100_000, 500, 0);
        let id = loan.id;
        execute(
            &mut loan,
            &LoanCommand::RecordRepayment(RecordRepayment {
                tenant_id: tenant,
                loan_id: id,
                amount: 1_000,
                method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let err = loan
            .handle(&LoanCommand::Cancel(CancelLoan {
                tenant_id: tenant,
                loan_id: loan.id,
                reason: "entered twice".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn defaulted_loans_record_the_outstanding_amount() {
        let (mut loan, tenant) = granted(LoanSource::Bank, 200_000, 1_500, 12);
        let id = loan.id;
        let events = execute(
            &mut loan,
            &LoanCommand::MarkDefaulted(MarkDefaulted {
                tenant_id: tenant,
                loan_id: id,
                reason: "lender wrote off".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let LoanEvent::Defaulted(defaulted) = &events[0] else {
            panic!("expected Defaulted");
        };
        assert_eq!(defaulted.outstanding, 230_000);
        assert_eq!(loan.status, LoanStatus::Defaulted);
    }
}
