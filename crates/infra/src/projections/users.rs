//! User directory read model.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use ventora_auth::{Role, UserEvent};
use ventora_core::{TenantId, UserId};
use ventora_events::EventEnvelope;

use super::cursor_store::ProjectionCursorStore;
use super::gate::{EnvelopeGate, ProjectionError, prepare_rebuild};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub suspended: bool,
}

impl UserReadModel {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

pub struct UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    store: S,
    gate: EnvelopeGate,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            gate: EnvelopeGate::new("auth.users"),
        }
    }

    pub fn with_persistent_cursors(mut self, cursors: Arc<dyn ProjectionCursorStore>) -> Self {
        self.gate = self.gate.with_persistent_cursors(cursors);
        self
    }

    pub fn get(&self, tenant_id: TenantId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(tenant_id, user_id)
    }

    pub fn find_by_email(&self, tenant_id: TenantId, email: &str) -> Option<UserReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<UserReadModel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.email.cmp(&b.email));
        all
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "auth.user" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.gate.admit(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: UserEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, user_id) = match &ev {
            UserEvent::Created(e) => (e.tenant_id, e.user_id),
            UserEvent::ProfileUpdated(e) => (e.tenant_id, e.user_id),
            UserEvent::RoleAssigned(e) => (e.tenant_id, e.user_id),
            UserEvent::RoleRevoked(e) => (e.tenant_id, e.user_id),
            UserEvent::Suspended(e) => (e.tenant_id, e.user_id),
            UserEvent::Reinstated(e) => (e.tenant_id, e.user_id),
        };

        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if user_id.as_uuid() != aggregate_id.as_uuid() {
            return Err(ProjectionError::TenantIsolation(
                "event user_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            UserEvent::Created(e) => {
                self.store.upsert(
                    tenant_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        email: e.email,
                        display_name: e.display_name,
                        roles: e.initial_roles,
                        suspended: false,
                    },
                );
            }
            UserEvent::ProfileUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.display_name = e.display_name;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::RoleAssigned(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    if !rm.roles.contains(&e.role) {
                        rm.roles.push(e.role);
                    }
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::RoleRevoked(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.roles.retain(|r| *r != e.role);
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::Suspended(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.suspended = true;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::Reinstated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.suspended = false;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
        }

        self.gate.commit(tenant_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let (envs, tenants) = prepare_rebuild(envelopes);
        for t in tenants {
            self.store.clear_tenant(t);
            self.gate.clear_tenant(t);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
