use platform_auth::Principal;
use platform_core::{PrincipalId, TenantId};

/// Authenticated principal for a request, inserted by the auth middleware.
///
/// This is immutable and present for every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.id()
    }

    /// `None` only for a global-scope principal without a home tenant.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.principal.tenant_id()
    }
}
