//! Invoice aggregate.
//!
//! Invoices are issued automatically when a sale is confirmed (the
//! sale-invoicing saga dispatches `Issue`), so issuance carries the sale
//! reference. Payment numbers derive from the invoice number
//! (`FAC2026000001-PAY001`, `-PAY002`, ...). A payment can never exceed the
//! outstanding amount, and only unpaid invoices can be cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{
    Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, PaymentMethod, TenantId,
};
use ventora_customers::CustomerId;
use ventora_events::Event;
use ventora_sales::SaleId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_number: DocumentNumber,
    pub amount: u64,
    pub method: PaymentMethod,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub tenant_id: Option<TenantId>,
    pub number: Option<DocumentNumber>,
    pub sale_id: Option<SaleId>,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    pub paid: u64,
    pub due_date: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub payments: Vec<Payment>,
    pub version: u64,
    pub created: bool,
}

impl Invoice {
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: None,
            sale_id: None,
            customer_id: None,
            total: 0,
            paid: 0,
            due_date: None,
            status: PaymentStatus::Unpaid,
            payments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.total.saturating_sub(self.paid)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.due_date) {
            (PaymentStatus::Unpaid | PaymentStatus::Partial, Some(due)) => now > due,
            _ => false,
        }
    }

    /// Number for the next payment: `<invoice>-PAY<nnn>`.
    fn next_payment_number(&self) -> Result<DocumentNumber, DomainError> {
        let number = self
            .number
            .as_ref()
            .ok_or_else(|| DomainError::invariant("invoice has no number"))?;
        DocumentNumber::render_payment(number, self.payments.len() as u64 + 1)
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

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: DocumentNumber,
    pub sale_id: Option<SaleId>,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Issue(IssueInvoice),
    RegisterPayment(RegisterPayment),
    Cancel(CancelInvoice),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: DocumentNumber,
    pub sale_id: Option<SaleId>,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment_number: DocumentNumber,
    pub amount: u64,
    pub method: PaymentMethod,
    /// Cumulative paid amount after this payment.
    pub paid_total: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: DocumentNumber,
    pub sale_id: Option<SaleId>,
    pub customer_id: Option<CustomerId>,
    pub total: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvoiceEvent {
    Issued(InvoiceIssued),
    PaymentRegistered(PaymentRegistered),
    Paid(InvoicePaid),
    Cancelled(InvoiceCancelled),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Issued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::Paid(_) => "invoicing.invoice.paid",
            InvoiceEvent::Cancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Issued(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::Paid(e) => e.occurred_at,
            InvoiceEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Issued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = Some(e.number.clone());
                self.sale_id = e.sale_id;
                self.customer_id = e.customer_id;
                self.total = e.total;
                self.due_date = e.due_date;
                self.status = PaymentStatus::Unpaid;
                self.created = true;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.payments.push(Payment {
                    payment_number: e.payment_number.clone(),
                    amount: e.amount,
                    method: e.method,
                    received_at: e.occurred_at,
                });
                self.paid = e.paid_total;
                self.status = if self.paid >= self.total {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::Partial
                };
            }
            InvoiceEvent::Paid(_) => {
                // Terminal marker; paid/status were already set by the
                // accompanying PaymentRegistered.
                self.status = PaymentStatus::Paid;
            }
            InvoiceEvent::Cancelled(_) => {
                self.status = PaymentStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Issue(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Invoice {
    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already issued"));
        }
        if cmd.total == 0 {
            return Err(DomainError::validation("invoice total must be positive"));
        }

        Ok(vec![InvoiceEvent::Issued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            sale_id: cmd.sale_id,
            customer_id: cmd.customer_id,
            total: cmd.total,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == PaymentStatus::Cancelled {
            return Err(DomainError::invariant("invoice is cancelled"));
        }
        if self.status == PaymentStatus::Paid {
            return Err(DomainError::invariant("invoice is already paid"));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if cmd.amount > self.outstanding() {
            return Err(DomainError::invariant(format!(
                "payment of {} exceeds outstanding {}",
                cmd.amount,
                self.outstanding()
            )));
        }

        let payment_number = self.next_payment_number()?;
        let paid_total = self.paid + cmd.amount;

        let mut events = vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment_number,
            amount: cmd.amount,
            method: cmd.method,
            paid_total,
            occurred_at: cmd.occurred_at,
        })];

        if paid_total >= self.total {
            let number = self
                .number
                .clone()
                .ok_or_else(|| DomainError::invariant("invoice has no number"))?;
            events.push(InvoiceEvent::Paid(InvoicePaid {
                tenant_id: cmd.tenant_id,
                invoice_id: cmd.invoice_id,
                number,
                sale_id: self.sale_id,
                customer_id: self.customer_id,
                total: self.total,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == PaymentStatus::Cancelled {
            return Err(DomainError::conflict("invoice already cancelled"));
        }
        if !self.payments.is_empty() {
            return Err(DomainError::invariant(
                "invoices with payments cannot be cancelled",
            ));
        }

        Ok(vec![InvoiceEvent::Cancelled(InvoiceCancelled {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ventora_core::DocumentKind;
    use ventora_events::execute;

    fn issued(total: u64) -> (Invoice, TenantId) {
        let tenant = TenantId::new();
        let id = InvoiceId::new(AggregateId::new());
        let mut invoice = Invoice::empty(id);
        execute(
            &mut invoice,
            &InvoiceCommand::Issue(IssueInvoice {
                tenant_id: tenant,
                invoice_id: id,
                number: DocumentNumber::render(DocumentKind::Invoice, 2026, 1).unwrap(),
                sale_id: Some(SaleId::new(AggregateId::new())),
                customer_id: Some(CustomerId::new(AggregateId::new())),
                total,
                due_date: Some(Utc::now() + Duration::days(30)),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (invoice, tenant)
    }

    fn pay(invoice: &mut Invoice, tenant: TenantId, amount: u64) -> Vec<InvoiceEvent> {
        let id = invoice.id;
        execute(
            invoice,
            &InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id: tenant,
                invoice_id: id,
                amount,
                method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap()
    }

    #[test]
    fn partial_payment_moves_status_to_partial() {
        let (mut invoice, tenant) = issued(10_000);
        let events = pay(&mut invoice, tenant, 4_000);
        assert_eq!(events.len(), 1);
        assert_eq!(invoice.status, PaymentStatus::Partial);
        assert_eq!(invoice.outstanding(), 6_000);
    }

    #[test]
    fn payment_numbers_derive_from_the_invoice_number() {
        let (mut invoice, tenant) = issued(10_000);
        pay(&mut invoice, tenant, 4_000);
        pay(&mut invoice, tenant, 1_000);
        assert_eq!(
            invoice.payments[0].payment_number.as_str(),
            "FAC2026000001-PAY001"
        );
        assert_eq!(
            invoice.payments[1].payment_number.as_str(),
            "FAC2026000001-PAY002"
        );
    }

    #[test]
    fn final_payment_also_emits_paid() {
        let (mut invoice, tenant) = issued(10_000);
        pay(&mut invoice, tenant, 4_000);
        let events = pay(&mut invoice, tenant, 6_000);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], InvoiceEvent::Paid(_)));
        assert_eq!(invoice.status, PaymentStatus::Paid);
        assert_eq!(invoice.outstanding(), 0);
    }

    #[test]
    fn overpayment_is_rejected() {
        let (mut invoice, tenant) = issued(10_000);
        pay(&mut invoice, tenant, 9_000);
        let err = invoice
            .handle(&InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id: tenant,
                invoice_id: invoice.id,
                amount: 1_001,
                method: PaymentMethod::MobileMoney,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancelling_after_a_payment_is_rejected() {
        let (mut invoice, tenant) = issued(10_000);
        pay(&mut invoice, tenant, 1_000);
        let err = invoice
            .handle(&InvoiceCommand::Cancel(CancelInvoice {
                tenant_id: tenant,
                invoice_id: invoice.id,
                reason: "duplicate".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overdue_depends_on_status_and_due_date() {
        let (mut invoice, tenant) = issued(5_000);
        let later = Utc::now() + Duration::days(60);
        assert!(invoice.is_overdue(later));

        pay(&mut invoice, tenant, 5_000);
        assert!(!invoice.is_overdue(later));
    }
}
