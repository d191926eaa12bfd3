//! Sale → invoice saga.
//!
//! Every confirmed sale gets an invoice:
//! 1. Sale confirmed → request an invoice for the sale total
//! 2. Invoice issued → wait for settlement
//! 3. Invoice fully paid → complete the sale, then complete
//!
//! A sale cancelled before the invoice exists abandons the saga; cancelled
//! later, the saga compensates by cancelling the invoice (a no-op once the
//! invoice has payments).

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use ventora_core::{AggregateId, TenantId};
use ventora_events::{EventEnvelope, Saga, SagaAction};
use ventora_sales::SaleId;

/// Mask applied to the sale id so the saga stream never shares an
/// aggregate id with the sale's own stream. Must stay stable forever.
const SAGA_ID_MASK: [u8; 16] = [
    0x5a, 0x1e, 0x1c, 0x0f, 0x9b, 0x3d, 0x44, 0x21, 0x8c, 0x6e, 0x02, 0xd7, 0x65, 0xaa, 0x13,
    0x78,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SaleInvoicingState {
    #[default]
    AwaitingConfirmation,
    InvoiceRequested {
        invoice_id: Uuid,
    },
    InvoiceIssued {
        invoice_id: Uuid,
    },
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleInvoicingSagaEvent {
    SaleConfirmedReceived { invoice_id: Uuid },
    InvoiceIssuedReceived { invoice_id: Uuid },
    InvoicePaidReceived { invoice_id: Uuid },
    SaleAbandoned { reason: String },
}

pub struct SaleInvoicingSaga;

impl SaleInvoicingSaga {
    fn sale_id_from(payload: &JsonValue, variant: &str) -> Option<SaleId> {
        let id = payload.get(variant)?.get("sale_id")?.as_str()?;
        let uuid = Uuid::parse_str(id).ok()?;
        Some(SaleId::new(AggregateId::from_uuid(uuid)))
    }

    fn abandon_and_cancel_invoice(
        tenant_id: TenantId,
        invoice_id: Uuid,
        reason: &str,
    ) -> Vec<SagaAction> {
        vec![
            SagaAction::Emit {
                event_type: "saga.sale_invoicing.sale_abandoned".to_string(),
                payload: serde_json::to_value(SaleInvoicingSagaEvent::SaleAbandoned {
                    reason: reason.to_string(),
                })
                .unwrap_or(JsonValue::Null),
            },
            SagaAction::Compensate {
                aggregate_type: "invoicing.invoice".to_string(),
                command_type: "cancel_invoice".to_string(),
                payload: json!({
                    "tenant_id": tenant_id,
                    "invoice_id": invoice_id,
                    "reason": "sale cancelled",
                }),
            },
        ]
    }
}

impl Saga for SaleInvoicingSaga {
    type State = SaleInvoicingState;
    type SagaEvent = SaleInvoicingSagaEvent;
    type CorrelationId = SaleId;

    fn saga_type() -> &'static str {
        "saga.sale_invoicing"
    }

    fn correlate(envelope: &EventEnvelope<JsonValue>) -> Option<Self::CorrelationId> {
        match envelope.aggregate_type() {
            "sales.sale" => Self::sale_id_from(envelope.payload(), "Confirmed")
                .or_else(|| Self::sale_id_from(envelope.payload(), "Cancelled")),
            "invoicing.invoice" => Self::sale_id_from(envelope.payload(), "Issued")
                .or_else(|| Self::sale_id_from(envelope.payload(), "Paid")),
            _ => None,
        }
    }

    fn saga_id(_tenant_id: TenantId, correlation: &Self::CorrelationId) -> AggregateId {
        let mut bytes = *correlation.0.as_uuid().as_bytes();
        for (b, mask) in bytes.iter_mut().zip(SAGA_ID_MASK) {
            *b ^= mask;
        }
        AggregateId::from_uuid(Uuid::from_bytes(bytes))
    }

    fn apply(state: &mut Self::State, event: &Self::SagaEvent) {
        match event {
            SaleInvoicingSagaEvent::SaleConfirmedReceived { invoice_id } => {
                *state = SaleInvoicingState::InvoiceRequested {
                    invoice_id: *invoice_id,
                };
            }
            SaleInvoicingSagaEvent::InvoiceIssuedReceived { invoice_id } => {
                *state = SaleInvoicingState::InvoiceIssued {
                    invoice_id: *invoice_id,
                };
            }
            SaleInvoicingSagaEvent::InvoicePaidReceived { .. } => {
                *state = SaleInvoicingState::Completed;
            }
            SaleInvoicingSagaEvent::SaleAbandoned { .. } => {
                *state = SaleInvoicingState::Abandoned;
            }
        }
    }

    fn react(
        state: &Self::State,
        tenant_id: TenantId,
        correlation: &Self::CorrelationId,
        incoming: &EventEnvelope<JsonValue>,
    ) -> Vec<SagaAction> {
        let payload = incoming.payload();

        match state {
            SaleInvoicingState::AwaitingConfirmation => {
                if incoming.aggregate_type() == "sales.sale" {
                    if let Some(confirmed) = payload.get("Confirmed") {
                        let invoice_id = Uuid::now_v7();
                        return vec![
                            SagaAction::Emit {
                                event_type: "saga.sale_invoicing.sale_confirmed_received"
                                    .to_string(),
                                payload: serde_json::to_value(
                                    SaleInvoicingSagaEvent::SaleConfirmedReceived { invoice_id },
                                )
                                .unwrap_or(JsonValue::Null),
                            },
                            SagaAction::Command {
                                aggregate_type: "invoicing.invoice".to_string(),
                                command_type: "issue_invoice".to_string(),
                                payload: json!({
                                    "tenant_id": tenant_id,
                                    "invoice_id": invoice_id,
                                    "sale_id": correlation.0,
                                    "customer_id": confirmed.get("customer_id").cloned(),
                                    "total": confirmed.get("total").cloned(),
                                }),
                            },
                        ];
                    }
                    if payload.get("Cancelled").is_some() {
                        return vec![
                            SagaAction::Emit {
                                event_type: "saga.sale_invoicing.sale_abandoned".to_string(),
                                payload: serde_json::to_value(
                                    SaleInvoicingSagaEvent::SaleAbandoned {
                                        reason: "sale cancelled before invoicing".to_string(),
                                    },
                                )
                                .unwrap_or(JsonValue::Null),
                            },
                            SagaAction::Complete,
                        ];
                    }
                }
                Vec::new()
            }
            SaleInvoicingState::InvoiceRequested { invoice_id } => {
                if incoming.aggregate_type() == "invoicing.invoice"
                    && payload.get("Issued").is_some()
                {
                    return vec![SagaAction::Emit {
                        event_type: "saga.sale_invoicing.invoice_issued_received".to_string(),
                        payload: serde_json::to_value(
                            SaleInvoicingSagaEvent::InvoiceIssuedReceived {
                                invoice_id: *invoice_id,
                            },
                        )
                        .unwrap_or(JsonValue::Null),
                    }];
                }
                if incoming.aggregate_type() == "sales.sale" && payload.get("Cancelled").is_some() {
                    return Self::abandon_and_cancel_invoice(
                        tenant_id,
                        *invoice_id,
                        "sale cancelled after invoice request",
                    );
                }
                Vec::new()
            }
            SaleInvoicingState::InvoiceIssued { invoice_id } => {
                if incoming.aggregate_type() == "invoicing.invoice"
                    && payload.get("Paid").is_some()
                {
                    return vec![
                        SagaAction::Emit {
                            event_type: "saga.sale_invoicing.invoice_paid_received".to_string(),
                            payload: serde_json::to_value(
                                SaleInvoicingSagaEvent::InvoicePaidReceived {
                                    invoice_id: *invoice_id,
                                },
                            )
                            .unwrap_or(JsonValue::Null),
                        },
                        SagaAction::Command {
                            aggregate_type: "sales.sale".to_string(),
                            command_type: "complete_sale".to_string(),
                            payload: json!({
                                "tenant_id": tenant_id,
                                "sale_id": correlation.0,
                            }),
                        },
                        SagaAction::Complete,
                    ];
                }
                if incoming.aggregate_type() == "sales.sale" && payload.get("Cancelled").is_some() {
                    return Self::abandon_and_cancel_invoice(
                        tenant_id,
                        *invoice_id,
                        "sale cancelled after invoicing",
                    );
                }
                Vec::new()
            }
            SaleInvoicingState::Completed | SaleInvoicingState::Abandoned => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use ventora_core::{DocumentKind, DocumentNumber};
    use ventora_invoicing::invoice::{InvoiceEvent, InvoiceId, InvoicePaid};
    use ventora_sales::SaleEvent;
    use ventora_sales::sale::{SaleCancelled, SaleConfirmed};

    use super::*;

    fn envelope(
        tenant_id: TenantId,
        sale_id: SaleId,
        event: &SaleEvent,
        seq: u64,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            sale_id.0,
            "sales.sale",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn confirmed_event(tenant_id: TenantId, sale_id: SaleId) -> SaleEvent {
        SaleEvent::Confirmed(SaleConfirmed {
            tenant_id,
            sale_id,
            number: DocumentNumber::render(DocumentKind::Sale, 2026, 7).unwrap(),
            store_id: ventora_inventory::StoreId::new(AggregateId::new()),
            customer_id: None,
            total: 25_000,
            lines: Vec::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn confirmation_requests_an_invoice() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let env = envelope(tenant_id, sale_id, &confirmed_event(tenant_id, sale_id), 4);

        assert_eq!(SaleInvoicingSaga::correlate(&env), Some(sale_id));

        let state = SaleInvoicingState::default();
        let actions = SaleInvoicingSaga::react(&state, tenant_id, &sale_id, &env);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], SagaAction::Emit { .. }));
        match &actions[1] {
            SagaAction::Command {
                aggregate_type,
                command_type,
                payload,
            } => {
                assert_eq!(aggregate_type, "invoicing.invoice");
                assert_eq!(command_type, "issue_invoice");
                assert_eq!(payload["total"], 25_000);
            }
            other => panic!("expected command action, got {other:?}"),
        }
    }

    #[test]
    fn emitted_event_advances_the_state_machine() {
        let mut state = SaleInvoicingState::default();
        let invoice_id = Uuid::now_v7();

        SaleInvoicingSaga::apply(
            &mut state,
            &SaleInvoicingSagaEvent::SaleConfirmedReceived { invoice_id },
        );
        assert_eq!(state, SaleInvoicingState::InvoiceRequested { invoice_id });

        SaleInvoicingSaga::apply(
            &mut state,
            &SaleInvoicingSagaEvent::InvoiceIssuedReceived { invoice_id },
        );
        assert_eq!(state, SaleInvoicingState::InvoiceIssued { invoice_id });

        SaleInvoicingSaga::apply(
            &mut state,
            &SaleInvoicingSagaEvent::InvoicePaidReceived { invoice_id },
        );
        assert_eq!(state, SaleInvoicingState::Completed);
    }

    #[test]
    fn full_payment_completes_the_sale() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let invoice_id = Uuid::now_v7();
        let event = InvoiceEvent::Paid(InvoicePaid {
            tenant_id,
            invoice_id: InvoiceId::new(AggregateId::from_uuid(invoice_id)),
            number: DocumentNumber::render(DocumentKind::Invoice, 2026, 7).unwrap(),
            sale_id: Some(sale_id),
            customer_id: None,
            total: 25_000,
            occurred_at: Utc::now(),
        });
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::from_uuid(invoice_id),
            "invoicing.invoice",
            3,
            serde_json::to_value(&event).unwrap(),
        );

        assert_eq!(SaleInvoicingSaga::correlate(&env), Some(sale_id));

        let state = SaleInvoicingState::InvoiceIssued { invoice_id };
        let actions = SaleInvoicingSaga::react(&state, tenant_id, &sale_id, &env);
        assert_eq!(actions.len(), 3);
        match &actions[1] {
            SagaAction::Command {
                aggregate_type,
                command_type,
                payload,
            } => {
                assert_eq!(aggregate_type, "sales.sale");
                assert_eq!(command_type, "complete_sale");
                assert_eq!(payload["sale_id"], serde_json::to_value(sale_id).unwrap());
            }
            other => panic!("expected command action, got {other:?}"),
        }
        assert!(matches!(actions[2], SagaAction::Complete));
    }

    #[test]
    fn redelivered_confirmation_produces_nothing_after_the_request() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let env = envelope(tenant_id, sale_id, &confirmed_event(tenant_id, sale_id), 4);

        let state = SaleInvoicingState::InvoiceRequested {
            invoice_id: Uuid::now_v7(),
        };
        assert!(SaleInvoicingSaga::react(&state, tenant_id, &sale_id, &env).is_empty());
    }

    #[test]
    fn cancellation_after_the_request_compensates() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let invoice_id = Uuid::now_v7();
        let env = envelope(
            tenant_id,
            sale_id,
            &SaleEvent::Cancelled(SaleCancelled {
                tenant_id,
                sale_id,
                reason: "customer walked out".to_string(),
                store_id: None,
                lines: Vec::new(),
                occurred_at: Utc::now(),
            }),
            5,
        );

        let state = SaleInvoicingState::InvoiceRequested { invoice_id };
        let actions = SaleInvoicingSaga::react(&state, tenant_id, &sale_id, &env);
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[1],
            SagaAction::Compensate { command_type, .. } if command_type == "cancel_invoice"
        ));
    }

    #[test]
    fn saga_stream_never_collides_with_the_sale_stream() {
        let tenant_id = TenantId::new();
        let sale_id = SaleId::new(AggregateId::new());
        let saga_id = SaleInvoicingSaga::saga_id(tenant_id, &sale_id);
        assert_ne!(saga_id, sale_id.0);
        // Deterministic across calls.
        assert_eq!(saga_id, SaleInvoicingSaga::saga_id(tenant_id, &sale_id));
    }
}
