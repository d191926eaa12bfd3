//! Shared admission logic for projections.
//!
//! Every projection needs the same guardrails before touching its read
//! model: skip envelopes already applied (at-least-once delivery), reject
//! sequence regressions or gaps, and reject payloads whose embedded tenant
//! disagrees with the envelope. `EnvelopeGate` centralizes that so each
//! projection only implements the event-to-read-model mapping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use ventora_core::{AggregateId, TenantId};

use super::cursor_store::ProjectionCursorStore;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

pub struct EnvelopeGate {
    cursors: RwLock<HashMap<CursorKey, u64>>,
    cursor_store: Option<Arc<dyn ProjectionCursorStore>>,
    projection_name: &'static str,
}

impl EnvelopeGate {
    pub fn new(projection_name: &'static str) -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            cursor_store: None,
            projection_name,
        }
    }

    pub fn with_persistent_cursors(
        mut self,
        cursor_store: Arc<dyn ProjectionCursorStore>,
    ) -> Self {
        self.cursor_store = Some(cursor_store);
        self
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        if let Some(ref store) = self.cursor_store {
            return store
                .get_cursor(tenant_id, aggregate_id, self.projection_name)
                .unwrap_or(0);
        }
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    /// Decide whether an envelope should be applied.
    ///
    /// `Ok(false)` means already applied (idempotent skip). A sequence gap
    /// after the first event is an error, because it would mean the read
    /// model silently missed a change.
    pub fn admit(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.cursor(tenant_id, aggregate_id);
        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(false);
        }
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        Ok(true)
    }

    pub fn commit(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }
        if let Some(ref store) = self.cursor_store {
            store.update_cursor(
                tenant_id,
                aggregate_id,
                self.projection_name,
                sequence_number,
            );
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
        if let Some(ref store) = self.cursor_store {
            store.clear_cursors(tenant_id, self.projection_name);
        }
    }
}

/// Order envelopes for a deterministic rebuild and list affected tenants.
pub fn prepare_rebuild<E>(
    envelopes: impl IntoIterator<Item = ventora_events::EventEnvelope<E>>,
) -> (Vec<ventora_events::EventEnvelope<E>>, Vec<TenantId>) {
    let mut envs: Vec<_> = envelopes.into_iter().collect();

    let mut tenants: Vec<_> = envs.iter().map(|e| e.tenant_id()).collect();
    tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
    tenants.dedup();

    envs.sort_by_key(|e| {
        (
            *e.tenant_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });

    (envs, tenants)
}
