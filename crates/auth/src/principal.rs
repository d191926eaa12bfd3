use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ventora_core::TenantId;

use crate::{Permission, Role, roles::role_permissions};

/// Identity of an authenticated principal (human user, service account, etc).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<PrincipalId> for Uuid {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A principal's membership in a tenant: which tenant they act within and
/// which roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    /// Build a membership from roles by expanding the built-in role catalog.
    ///
    /// This is how the API derives effective permissions from token roles.
    pub fn from_roles(tenant_id: TenantId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for perm in role_permissions(role.as_str()) {
                if !permissions.contains(&perm) {
                    permissions.push(perm);
                }
            }
        }
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_expands_roles_without_duplicates() {
        let tenant = TenantId::new();
        let m = TenantMembership::from_roles(
            tenant,
            vec![Role::cashier(), Role::stock_keeper()],
        );

        assert!(m.permissions.iter().any(|p| p.as_str() == "sales.manage"));
        assert!(m.permissions.iter().any(|p| p.as_str() == "counts.manage"));

        let unique: std::collections::HashSet<&str> =
            m.permissions.iter().map(|p| p.as_str()).collect();
        assert_eq!(unique.len(), m.permissions.len());
    }
}
