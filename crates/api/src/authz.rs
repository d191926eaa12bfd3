//! Authorization guard at the command boundary.
//!
//! Enforced before dispatch so domain aggregates and infra stay
//! auth-agnostic. Effective permissions come from the built-in role
//! catalog via [`TenantMembership::from_roles`].

use ventora_auth::{AuthzError, CommandAuthorization, Principal, TenantMembership, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership =
        TenantMembership::from_roles(tenant.tenant_id(), principal.roles().to_vec());

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}
