//! Materializes the commands requested by the sale saga.
//!
//! The saga only decides *that* an invoice must be issued or cancelled, or
//! that a settled sale must be completed; the executor turns that decision
//! into a real command: it allocates the FAC document number, fills in the
//! due date policy and runs the command through the regular dispatcher.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ventora_core::{AggregateId, DocumentKind, TenantId};
use ventora_customers::CustomerId;
use ventora_events::{EventBus, EventEnvelope};
use ventora_invoicing::invoice::{CancelInvoice, IssueInvoice};
use ventora_invoicing::{Invoice, InvoiceCommand, InvoiceId};
use ventora_sales::sale::CompleteSale;
use ventora_sales::{Sale, SaleCommand, SaleId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::numbering::{NumberAllocator, allocate_number};

use super::{SagaCommandExecutor, SagaError};

const INVOICE_AGGREGATE: &str = "invoicing.invoice";
const SALE_AGGREGATE: &str = "sales.sale";

/// Invoices fall due 30 days after issuance.
const PAYMENT_TERM_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
struct IssueInvoicePayload {
    invoice_id: Uuid,
    sale_id: Uuid,
    customer_id: Option<CustomerId>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CancelInvoicePayload {
    invoice_id: Uuid,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct CompleteSalePayload {
    sale_id: Uuid,
}

pub struct InvoicingSagaExecutor<S, B, N> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    numbers: Arc<N>,
}

impl<S, B, N> InvoicingSagaExecutor<S, B, N> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, numbers: Arc<N>) -> Self {
        Self {
            dispatcher,
            numbers,
        }
    }
}

impl<S, B, N> SagaCommandExecutor for InvoicingSagaExecutor<S, B, N>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    N: NumberAllocator,
{
    fn execute(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        command_type: &str,
        payload: &JsonValue,
    ) -> Result<(), SagaError> {
        match (aggregate_type, command_type) {
            (INVOICE_AGGREGATE, "issue_invoice") => {
                let p: IssueInvoicePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| SagaError::Deserialize(e.to_string()))?;

                let now = Utc::now();
                let number =
                    allocate_number(&*self.numbers, tenant_id, DocumentKind::Invoice, now)
                        .map_err(|e| SagaError::Execute(e.to_string()))?;

                let invoice_id = InvoiceId::new(AggregateId::from_uuid(p.invoice_id));
                let result = self.dispatcher.dispatch::<Invoice>(
                    tenant_id,
                    invoice_id.0,
                    INVOICE_AGGREGATE,
                    InvoiceCommand::Issue(IssueInvoice {
                        tenant_id,
                        invoice_id,
                        number,
                        sale_id: Some(SaleId::new(AggregateId::from_uuid(p.sale_id))),
                        customer_id: p.customer_id,
                        total: p.total,
                        due_date: Some(now + Duration::days(PAYMENT_TERM_DAYS)),
                        occurred_at: now,
                    }),
                    |_, id| Invoice::empty(InvoiceId::new(id)),
                );

                match result {
                    Ok(_) => Ok(()),
                    // Redelivery after a crash between command dispatch and
                    // saga event confirmation: the invoice already exists.
                    Err(DispatchError::Concurrency(_)) => Ok(()),
                    Err(e) => Err(SagaError::Execute(format!("issue_invoice: {e:?}"))),
                }
            }
            (INVOICE_AGGREGATE, "cancel_invoice") => {
                let p: CancelInvoicePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| SagaError::Deserialize(e.to_string()))?;

                let invoice_id = InvoiceId::new(AggregateId::from_uuid(p.invoice_id));
                let result = self.dispatcher.dispatch::<Invoice>(
                    tenant_id,
                    invoice_id.0,
                    INVOICE_AGGREGATE,
                    InvoiceCommand::Cancel(CancelInvoice {
                        tenant_id,
                        invoice_id,
                        reason: p.reason,
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Invoice::empty(InvoiceId::new(id)),
                );

                match result {
                    Ok(_) => Ok(()),
                    // Cancelling an already-cancelled invoice is a replay.
                    Err(DispatchError::Concurrency(_)) => Ok(()),
                    // Payments were recorded before the cancellation arrived;
                    // the compensation is best-effort and the invoice stays
                    // issued.
                    Err(DispatchError::InvariantViolation(_)) => Ok(()),
                    Err(e) => Err(SagaError::Execute(format!("cancel_invoice: {e:?}"))),
                }
            }
            (SALE_AGGREGATE, "complete_sale") => {
                let p: CompleteSalePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| SagaError::Deserialize(e.to_string()))?;

                let sale_id = SaleId::new(AggregateId::from_uuid(p.sale_id));
                let result = self.dispatcher.dispatch::<Sale>(
                    tenant_id,
                    sale_id.0,
                    SALE_AGGREGATE,
                    SaleCommand::Complete(CompleteSale {
                        tenant_id,
                        sale_id,
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Sale::empty(SaleId::new(id)),
                );

                match result {
                    Ok(_) => Ok(()),
                    // Replays land here once the sale is already completed.
                    Err(DispatchError::Concurrency(_)) => Ok(()),
                    // The sale left the confirmed state in the meantime
                    // (cancelled over the counter); it stays as it is.
                    Err(DispatchError::InvariantViolation(_)) => Ok(()),
                    Err(e) => Err(SagaError::Execute(format!("complete_sale: {e:?}"))),
                }
            }
            (aggregate, command) => Err(SagaError::Execute(format!(
                "unsupported saga command: {aggregate}/{command}"
            ))),
        }
    }
}
