//! Authorization engine: one store round trip, then the pure decision.

use std::sync::Arc;

use tracing::{instrument, warn};

use platform_auth::{
    AccessError, AccessGrant, AuthorizationExplanation, Decision, Permission, PermissionSet, Principal, decide,
    explain_authorization,
};
use platform_core::TenantId;

use crate::store::RbacStore;

#[derive(Clone)]
pub struct AuthorizationEngine {
    store: Arc<dyn RbacStore>,
}

impl AuthorizationEngine {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    async fn grant_for(&self, principal: Option<&Principal>, permission: &Permission) -> Result<AccessGrant, AccessError> {
        match principal {
            // Decided without the store.
            None => Ok(AccessGrant::nothing()),
            Some(p) if !p.is_active() => Ok(AccessGrant::nothing()),
            Some(p) => Ok(self.store.access_grant(p.role().id, permission).await?),
        }
    }

    /// Decision with its reason. Store failures surface as `Unavailable`.
    #[instrument(
        skip(self, principal),
        fields(principal_id = ?principal.map(|p| p.id()), permission = %permission),
        err
    )]
    pub async fn check(&self, principal: Option<&Principal>, permission: &Permission) -> Result<Decision, AccessError> {
        let grant = self.grant_for(principal, permission).await?;
        Ok(decide(principal, permission, &grant))
    }

    /// Boolean form: anything but an explicit allow, including a store
    /// failure, is `false`.
    pub async fn authorize(&self, principal: Option<&Principal>, permission: &Permission) -> bool {
        match self.check(principal, permission).await {
            Ok(decision) => decision.is_allowed(),
            Err(err) => {
                warn!(error = %err, permission = %permission, "authorization check failed closed");
                false
            }
        }
    }

    /// `Ok(())` only on allow; a deny becomes `Forbidden`.
    pub async fn require(&self, principal: &Principal, permission: &Permission) -> Result<(), AccessError> {
        match self.check(Some(principal), permission).await? {
            Decision::Allow(_) => Ok(()),
            Decision::Deny(kind) => Err(AccessError::forbidden(format!(
                "missing permission '{permission}' ({kind:?})"
            ))),
        }
    }

    pub fn authorize_self_or_same_tenant(&self, principal: Option<&Principal>, target_tenant_id: TenantId) -> bool {
        platform_auth::authorize_self_or_same_tenant(principal, target_tenant_id)
    }

    pub async fn explain(
        &self,
        principal: Option<&Principal>,
        permission: &Permission,
    ) -> Result<AuthorizationExplanation, AccessError> {
        let grant = match principal {
            Some(p) => self.store.access_grant(p.role().id, permission).await?,
            None => AccessGrant::nothing(),
        };
        Ok(explain_authorization(principal, permission, &grant))
    }

    /// Identifiers the principal holds right now. The wildcard is expanded
    /// against the permission table at call time.
    #[instrument(skip(self, principal), fields(principal_id = %principal.id()), err)]
    pub async fn effective_permissions(&self, principal: &Principal) -> Result<Vec<Permission>, AccessError> {
        if !principal.is_active() {
            return Ok(Vec::new());
        }
        let Some(role) = self.store.get_role(principal.role().id).await? else {
            return Ok(Vec::new());
        };
        let defined = self.store.list_permissions().await?;
        let held = match role.effective_permissions() {
            PermissionSet::All => defined.into_iter().map(|p| p.name).collect(),
            PermissionSet::Explicit(set) => defined
                .into_iter()
                .map(|p| p.name)
                .filter(|name| set.contains(name))
                .collect(),
        };
        Ok(held)
    }
}
