//! User (principal) administration guarded by the authorization core.
//!
//! Holders of the global-scope role are invisible to non-global callers:
//! they are left out of listings and every lookup of one is `NotFound`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use platform_auth::catalog::{DELETE_USERS, EDIT_USERS, VIEW_USERS};
use platform_auth::tenant_filter::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use platform_auth::{AccessError, Principal, TenantPredicate};
use platform_core::PrincipalId;

use crate::engine::AuthorizationEngine;
use crate::store::{PrincipalDirectory, PrincipalPatch, PrincipalRecord, PrincipalScope, RbacStore};

#[derive(Clone)]
pub struct UserAdmin {
    engine: AuthorizationEngine,
    roles: Arc<dyn RbacStore>,
    directory: Arc<dyn PrincipalDirectory>,
}

/// One page of a user listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPage {
    pub users: Vec<PrincipalRecord>,
    pub offset: u32,
    pub limit: u32,
}

fn caller_predicate(caller: &Principal) -> Result<TenantPredicate, AccessError> {
    if caller.is_global_scope() {
        return Ok(TenantPredicate::Any);
    }
    caller
        .tenant_id()
        .map(TenantPredicate::Tenant)
        .ok_or(AccessError::NotFound)
}

fn caller_scope(caller: &Principal) -> Result<PrincipalScope, AccessError> {
    Ok(PrincipalScope {
        predicate: caller_predicate(caller)?,
        include_global_scope: caller.is_global_scope(),
    })
}

impl UserAdmin {
    pub fn new(engine: AuthorizationEngine, roles: Arc<dyn RbacStore>, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self {
            engine,
            roles,
            directory,
        }
    }

    /// Principal `id` as far as `caller` may see it.
    async fn visible_target(&self, caller: &Principal, id: PrincipalId) -> Result<PrincipalRecord, AccessError> {
        let target = self
            .directory
            .get_principal(id, caller_predicate(caller)?)
            .await?
            .ok_or(AccessError::NotFound)?;
        if !caller.is_global_scope() && self.holds_global_scope(&target).await? {
            return Err(AccessError::NotFound);
        }
        if let Some(tenant_id) = target.tenant_id {
            if !self.engine.authorize_self_or_same_tenant(Some(caller), tenant_id) {
                return Err(AccessError::NotFound);
            }
        }
        Ok(target)
    }

    async fn holds_global_scope(&self, target: &PrincipalRecord) -> Result<bool, AccessError> {
        Ok(self
            .roles
            .get_role(target.role_id)
            .await?
            .is_some_and(|role| role.global_scope))
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id()), err)]
    pub async fn get_user(&self, caller: &Principal, id: PrincipalId) -> Result<PrincipalRecord, AccessError> {
        self.engine.require(caller, &VIEW_USERS).await?;
        self.visible_target(caller, id).await
    }

    /// Users of the caller's tenant (every tenant for a global caller),
    /// oldest first. `limit` defaults to 100 and is capped at 500.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id()), err)]
    pub async fn list_users(
        &self,
        caller: &Principal,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> Result<UserPage, AccessError> {
        self.engine.require(caller, &VIEW_USERS).await?;
        let offset = offset.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let users = self.directory.list_principals(caller_scope(caller)?, offset, limit).await?;
        Ok(UserPage { users, offset, limit })
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id()), err)]
    pub async fn count_users(&self, caller: &Principal) -> Result<u64, AccessError> {
        self.engine.require(caller, &VIEW_USERS).await?;
        Ok(self.directory.count_principals(caller_scope(caller)?).await?)
    }

    /// Change a user's role, active flag or name.
    ///
    /// Role changes are reserved to global-scope callers, and a tenantless
    /// user can only hold the global-scope role.
    #[instrument(skip(self, caller, patch), fields(caller_id = %caller.id()), err)]
    pub async fn update_user(
        &self,
        caller: &Principal,
        id: PrincipalId,
        patch: PrincipalPatch,
    ) -> Result<PrincipalRecord, AccessError> {
        self.engine.require(caller, &EDIT_USERS).await?;
        let target = self.visible_target(caller, id).await?;

        if patch.is_empty() {
            return Ok(target);
        }

        if let Some(role_id) = patch.role_id {
            if !caller.is_global_scope() {
                return Err(AccessError::forbidden("only a global-scope principal can change user roles"));
            }
            let role = self
                .roles
                .get_role(role_id)
                .await?
                .ok_or_else(|| AccessError::validation(format!("role {role_id} does not exist")))?;
            if !role.global_scope && target.tenant_id.is_none() {
                return Err(AccessError::validation("a principal without a tenant needs the global-scope role"));
            }
        }

        let updated = self
            .directory
            .update_principal(id, caller_predicate(caller)?, &patch)
            .await?
            .ok_or(AccessError::NotFound)?;
        info!(principal_id = %id, "user updated");
        Ok(updated)
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id()), err)]
    pub async fn delete_user(&self, caller: &Principal, id: PrincipalId) -> Result<(), AccessError> {
        self.engine.require(caller, &DELETE_USERS).await?;
        self.visible_target(caller, id).await?;
        if !self.directory.delete_principal(id, caller_predicate(caller)?).await? {
            return Err(AccessError::NotFound);
        }
        info!(principal_id = %id, "user deleted");
        Ok(())
    }
}
