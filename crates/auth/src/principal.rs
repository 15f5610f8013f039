use serde::{Deserialize, Serialize};

use platform_core::{PrincipalId, TenantId};

use crate::{AccessError, RoleRef};

/// A resolved, authenticated principal.
///
/// Fields are private so the tenant invariant holds for every instance: only a
/// principal whose role is global-scope may exist without a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    tenant_id: Option<TenantId>,
    role: RoleRef,
    global_scope: bool,
    is_active: bool,
}

impl Principal {
    pub fn new(
        id: PrincipalId,
        tenant_id: Option<TenantId>,
        role: RoleRef,
        global_scope: bool,
        is_active: bool,
    ) -> Result<Self, AccessError> {
        if tenant_id.is_none() && !global_scope {
            return Err(AccessError::validation(format!(
                "principal {id} has no tenant but role '{}' is not global-scope",
                role.name
            )));
        }
        Ok(Self {
            id,
            tenant_id,
            role,
            global_scope,
            is_active,
        })
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn role(&self) -> &RoleRef {
        &self.role
    }

    /// Whether the principal's role was the designated global-scope role when
    /// the principal was resolved.
    pub fn is_global_scope(&self) -> bool {
        self.global_scope
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}
