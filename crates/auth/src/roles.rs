use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at the type level; the four built-in roles below
/// carry the permission mapping the platform ships with. Unknown roles are
/// rejected when assigned to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self(Cow::Borrowed("admin"))
    }

    pub fn manager() -> Self {
        Self(Cow::Borrowed("manager"))
    }

    pub fn cashier() -> Self {
        Self(Cow::Borrowed("cashier"))
    }

    pub fn stock_keeper() -> Self {
        Self(Cow::Borrowed("stock_keeper"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_builtin(&self) -> bool {
        builtin_roles().iter().any(|(name, _)| *name == self.as_str())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The built-in role catalog: role name to the permissions it grants.
///
/// - `admin` gets the wildcard.
/// - `manager` runs day-to-day operations including expense approval.
/// - `cashier` covers the sales counter (sales, invoices, cash, customers).
/// - `stock_keeper` covers the warehouse side.
pub fn builtin_roles() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("admin", &["*"]),
        (
            "manager",
            &[
                "customers.manage",
                "products.manage",
                "services.manage",
                "inventory.manage",
                "transfers.manage",
                "counts.manage",
                "sales.manage",
                "invoices.manage",
                "cashbox.manage",
                "expenses.manage",
                "expenses.approve",
                "loans.manage",
                "users.manage",
                "reports.read",
            ],
        ),
        (
            "cashier",
            &[
                "customers.manage",
                "sales.manage",
                "invoices.manage",
                "cashbox.manage",
            ],
        ),
        (
            "stock_keeper",
            &[
                "products.manage",
                "inventory.manage",
                "transfers.manage",
                "counts.manage",
            ],
        ),
    ]
}

/// Expand a role name into the permissions it grants.
///
/// Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> Vec<Permission> {
    builtin_roles()
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, perms)| perms.iter().map(|p| Permission::new(*p)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_the_wildcard() {
        let perms = role_permissions("admin");
        assert_eq!(perms.len(), 1);
        assert!(perms[0].is_wildcard());
    }

    #[test]
    fn cashier_cannot_touch_inventory() {
        let perms = role_permissions("cashier");
        assert!(perms.iter().any(|p| p.as_str() == "sales.manage"));
        assert!(!perms.iter().any(|p| p.as_str() == "inventory.manage"));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(role_permissions("superuser").is_empty());
        assert!(!Role::new("superuser").is_builtin());
        assert!(Role::stock_keeper().is_builtin());
    }
}
