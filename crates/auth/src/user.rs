//! User aggregate (event-sourced identity management).
//!
//! Users are tenant-scoped staff accounts. Invariants:
//! - A user belongs to exactly one tenant (immutable after creation).
//! - Only built-in roles can be granted.
//! - Suspended users cannot receive new roles.
//! - Actors cannot grant roles they do not hold themselves (admins excepted).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use ventora_events::Event;

use crate::Role;

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
}

/// User aggregate.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r.as_str() == role.as_str())
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

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    /// Roles of the actor performing this operation (escalation check).
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinstateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    UpdateProfile(UpdateProfile),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    Suspend(SuspendUser),
    Reinstate(ReinstateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSuspended {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReinstated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    ProfileUpdated(ProfileUpdated),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
    Suspended(UserSuspended),
    Reinstated(UserReinstated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Reinstated(_) => "auth.user.reinstated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Reinstated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.roles = e.initial_roles.clone();
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::ProfileUpdated(e) => {
                self.display_name = e.display_name.clone();
            }
            UserEvent::RoleAssigned(e) => {
                self.roles.push(e.role.clone());
            }
            UserEvent::RoleRevoked(e) => {
                self.roles.retain(|r| r.as_str() != e.role.as_str());
            }
            UserEvent::Suspended(_) => {
                self.status = UserStatus::Suspended;
            }
            UserEvent::Reinstated(_) => {
                self.status = UserStatus::Active;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Reinstate(cmd) => self.handle_reinstate(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("user already exists"));
        }
        if cmd.email.trim().is_empty() || !cmd.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        for role in &cmd.initial_roles {
            if !role.is_builtin() {
                return Err(DomainError::validation(format!(
                    "unknown role '{role}'"
                )));
            }
        }

        Ok(vec![UserEvent::Created(UserCreated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email: cmd.email.trim().to_lowercase(),
            display_name: cmd.display_name.trim().to_string(),
            initial_roles: cmd.initial_roles.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        Ok(vec![UserEvent::ProfileUpdated(ProfileUpdated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            display_name: cmd.display_name.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        if !cmd.role.is_builtin() {
            return Err(DomainError::validation(format!(
                "unknown role '{}'",
                cmd.role
            )));
        }
        if self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role already assigned"));
        }

        // Escalation check: actors can only grant roles they hold, unless
        // they are admins.
        let actor_is_admin = cmd.actor_roles.iter().any(|r| r.as_str() == "admin");
        let actor_has_role = cmd
            .actor_roles
            .iter()
            .any(|r| r.as_str() == cmd.role.as_str());
        if !actor_is_admin && !actor_has_role {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role not assigned"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user already suspended"));
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == UserStatus::Active {
            return Err(DomainError::invariant("user is not suspended"));
        }

        Ok(vec![UserEvent::Reinstated(UserReinstated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn created_user(tenant: TenantId, id: UserId, roles: Vec<Role>) -> User {
        let mut user = User::empty(id);
        let events = user
            .handle(&UserCommand::Create(CreateUser {
                tenant_id: tenant,
                user_id: id,
                email: "Jo@Example.com".into(),
                display_name: " Jo ".into(),
                initial_roles: roles,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for ev in &events {
            user.apply(ev);
        }
        user
    }

    #[test]
    fn create_normalizes_email_and_name() {
        let user = created_user(TenantId::new(), UserId::new(), vec![Role::cashier()]);
        assert_eq!(user.email, "jo@example.com");
        assert_eq!(user.display_name, "Jo");
        assert_eq!(user.version, 1);
        assert!(user.created);
    }

    #[test]
    fn create_rejects_unknown_roles() {
        let user = User::empty(UserId::new());
        let err = user
            .handle(&UserCommand::Create(CreateUser {
                tenant_id: TenantId::new(),
                user_id: *user.id(),
                email: "a@b.c".into(),
                display_name: "A".into(),
                initial_roles: vec![Role::new("superuser")],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_admin_cannot_escalate() {
        let tenant = TenantId::new();
        let id = UserId::new();
        let user = created_user(tenant, id, vec![Role::cashier()]);

        let err = user
            .handle(&UserCommand::AssignRole(AssignRole {
                tenant_id: tenant,
                user_id: id,
                role: Role::manager(),
                actor_roles: vec![Role::cashier()],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn admin_can_grant_any_builtin_role() {
        let tenant = TenantId::new();
        let id = UserId::new();
        let mut user = created_user(tenant, id, vec![Role::cashier()]);

        let events = execute(
            &mut user,
            &UserCommand::AssignRole(AssignRole {
                tenant_id: tenant,
                user_id: id,
                role: Role::stock_keeper(),
                actor_roles: vec![Role::admin()],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert!(user.has_role(&Role::stock_keeper()));
    }

    #[test]
    fn suspended_user_cannot_receive_roles() {
        let tenant = TenantId::new();
        let id = UserId::new();
        let mut user = created_user(tenant, id, vec![Role::cashier()]);

        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                tenant_id: tenant,
                user_id: id,
                reason: "left the company".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(user.status, UserStatus::Suspended);

        let err = user
            .handle(&UserCommand::AssignRole(AssignRole {
                tenant_id: tenant,
                user_id: id,
                role: Role::manager(),
                actor_roles: vec![Role::admin()],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cross_tenant_commands_are_rejected() {
        let id = UserId::new();
        let user = created_user(TenantId::new(), id, vec![Role::cashier()]);

        let err = user
            .handle(&UserCommand::Suspend(SuspendUser {
                tenant_id: TenantId::new(),
                user_id: id,
                reason: "x".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn revoke_then_reinstate_round_trip() {
        let tenant = TenantId::new();
        let id = UserId::new();
        let mut user = created_user(tenant, id, vec![Role::cashier(), Role::manager()]);

        execute(
            &mut user,
            &UserCommand::RevokeRole(RevokeRole {
                tenant_id: tenant,
                user_id: id,
                role: Role::manager(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!user.has_role(&Role::manager()));

        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                tenant_id: tenant,
                user_id: id,
                reason: "audit".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut user,
            &UserCommand::Reinstate(ReinstateUser {
                tenant_id: tenant,
                user_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(user.status, UserStatus::Active);
        // create, revoke, suspend, reinstate.
        assert_eq!(user.version, 4);
    }
}
