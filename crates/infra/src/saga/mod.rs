//! Saga execution: persistence, command hand-off and the runner loop.
//!
//! Saga instances live in the event store like any aggregate, under the
//! saga's own aggregate type. The runner folds the persisted saga events
//! into typed state, asks the saga to react to an incoming domain event,
//! persists `Emit` actions first and only then hands commands to the
//! executor. Replayed deliveries therefore find the advanced state and
//! produce no duplicate commands.

pub mod invoicing_executor;
pub mod sale_invoicing;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use ventora_core::{AggregateId, ExpectedVersion, TenantId};
use ventora_events::{EventEnvelope, Saga, SagaAction};

use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

pub use invoicing_executor::InvoicingSagaExecutor;
pub use sale_invoicing::{SaleInvoicingSaga, SaleInvoicingSagaEvent, SaleInvoicingState};

#[derive(Debug, Error)]
pub enum SagaError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("failed to deserialize saga event: {0}")]
    Deserialize(String),

    #[error("command execution failed: {0}")]
    Execute(String),
}

/// Dispatches commands produced by saga actions.
///
/// The implementor owns command materialization: resolving the target
/// aggregate, allocating document numbers, and running the command through
/// the regular dispatcher.
pub trait SagaCommandExecutor: Send + Sync {
    fn execute(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        command_type: &str,
        payload: &JsonValue,
    ) -> Result<(), SagaError>;
}

/// Loads and persists one saga type's instances via the event store.
pub struct SagaRepository<S, E>
where
    S: Saga,
    E: EventStore,
{
    event_store: E,
    _saga: std::marker::PhantomData<S>,
}

impl<S, E> SagaRepository<S, E>
where
    S: Saga,
    E: EventStore,
{
    pub fn new(event_store: E) -> Self {
        Self {
            event_store,
            _saga: std::marker::PhantomData,
        }
    }

    /// Fold the persisted stream into typed saga state.
    pub fn load_state(
        &self,
        tenant_id: TenantId,
        correlation: &S::CorrelationId,
    ) -> Result<S::State, SagaError> {
        let saga_id = S::saga_id(tenant_id, correlation);
        let mut state = S::initial_state(tenant_id, correlation);
        for stored in self.event_store.load_stream(tenant_id, saga_id)? {
            let event: S::SagaEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| SagaError::Deserialize(e.to_string()))?;
            S::apply(&mut state, &event);
        }
        Ok(state)
    }

    /// Persist one saga event and apply it to the in-memory state.
    pub fn append(
        &self,
        tenant_id: TenantId,
        saga_id: AggregateId,
        state: &mut S::State,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<(), SagaError> {
        let event: S::SagaEvent = serde_json::from_value(payload.clone())
            .map_err(|e| SagaError::Deserialize(e.to_string()))?;

        self.event_store.append(
            vec![UncommittedEvent {
                event_id: uuid::Uuid::now_v7(),
                tenant_id,
                aggregate_id: saga_id,
                aggregate_type: S::saga_type().to_string(),
                event_type: event_type.to_string(),
                event_version: 1,
                occurred_at: chrono::Utc::now(),
                payload,
            }],
            ExpectedVersion::Any,
        )?;

        S::apply(state, &event);
        Ok(())
    }
}

/// Drives one saga type: correlate, react, persist, execute.
pub struct SagaRunner<S, E, X>
where
    S: Saga,
    E: EventStore,
    X: SagaCommandExecutor,
{
    repository: SagaRepository<S, E>,
    executor: X,
}

impl<S, E, X> SagaRunner<S, E, X>
where
    S: Saga,
    E: EventStore,
    X: SagaCommandExecutor,
{
    pub fn new(event_store: E, executor: X) -> Self {
        Self {
            repository: SagaRepository::new(event_store),
            executor,
        }
    }

    /// Feed one domain event envelope through the saga.
    ///
    /// Envelopes the saga does not correlate are ignored.
    pub fn handle_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), SagaError> {
        let Some(correlation) = S::correlate(envelope) else {
            return Ok(());
        };

        let tenant_id = envelope.tenant_id();
        let saga_id = S::saga_id(tenant_id, &correlation);
        let mut state = self.repository.load_state(tenant_id, &correlation)?;

        let actions = S::react(&state, tenant_id, &correlation, envelope);
        if actions.is_empty() {
            return Ok(());
        }

        debug!(
            saga_type = S::saga_type(),
            saga_id = %saga_id,
            action_count = actions.len(),
            "saga reacting"
        );

        // Emits first: once persisted, a redelivery of the same domain
        // event finds the advanced state and reacts with nothing.
        for action in &actions {
            if let SagaAction::Emit {
                event_type,
                payload,
            } = action
            {
                self.repository.append(
                    tenant_id,
                    saga_id,
                    &mut state,
                    event_type,
                    payload.clone(),
                )?;
            }
        }

        for action in &actions {
            match action {
                SagaAction::Emit { .. } => {}
                SagaAction::Command {
                    aggregate_type,
                    command_type,
                    payload,
                }
                | SagaAction::Compensate {
                    aggregate_type,
                    command_type,
                    payload,
                } => {
                    self.executor
                        .execute(tenant_id, aggregate_type, command_type, payload)?;
                }
                SagaAction::Complete => {
                    debug!(saga_type = S::saga_type(), saga_id = %saga_id, "saga completed");
                }
            }
        }

        Ok(())
    }

    /// Variant that logs and swallows failures, for bus-driven workers.
    pub fn handle_envelope_logged(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Err(error) = self.handle_envelope(envelope) {
            warn!(
                saga_type = S::saga_type(),
                %error,
                "saga failed to process envelope"
            );
        }
    }
}
