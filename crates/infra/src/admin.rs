//! Role and permission administration.
//!
//! Callers authorize first (`manage_roles` / `view_users` at the HTTP edge);
//! this service validates input and applies changes atomically.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use platform_auth::{
    AccessError, NewPermission, NewRole, PermissionDefinition, PermissionSet, PermissionUpdate, Role, RoleUpdate,
};
use platform_core::{PermissionId, RoleId};

use crate::store::RbacStore;

#[derive(Clone)]
pub struct RbacAdmin {
    store: Arc<dyn RbacStore>,
}

impl RbacAdmin {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    // ── Roles ────────────────────────────────────────────────────────────────

    #[instrument(skip(self, input), fields(role = %input.name), err)]
    pub async fn create_role(&self, input: NewRole) -> Result<Role, AccessError> {
        input.validate()?;
        let role = self.store.insert_role(input.into_role(RoleId::new(), Utc::now())).await?;
        info!(role_id = %role.id, "role created");
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> Result<Role, AccessError> {
        self.store.get_role(id).await?.ok_or(AccessError::NotFound)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AccessError> {
        Ok(self.store.list_roles().await?)
    }

    /// Only display name and description change; the name is immutable.
    #[instrument(skip(self, update), err)]
    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, AccessError> {
        update.validate()?;
        let mut role = self.get_role(id).await?;
        update.apply(&mut role, Utc::now());
        self.store.update_role(&role).await?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_role(&self, id: RoleId) -> Result<(), AccessError> {
        self.store.delete_role(id).await?;
        info!(role_id = %id, "role deleted");
        Ok(())
    }

    /// Make `id` the single global-scope role.
    #[instrument(skip(self), err)]
    pub async fn designate_global_scope(&self, id: RoleId) -> Result<Role, AccessError> {
        let role = self.store.set_global_scope(id).await?;
        info!(role_id = %id, role = %role.name, "global-scope role designated");
        Ok(role)
    }

    // ── Role permissions ─────────────────────────────────────────────────────

    pub async fn role_permissions(&self, role_id: RoleId) -> Result<PermissionSet, AccessError> {
        Ok(self.get_role(role_id).await?.permissions)
    }

    /// Replace the whole set. Idempotent; unknown identifiers leave the
    /// previous set untouched.
    #[instrument(skip(self, permissions), fields(wildcard = permissions.is_wildcard()), err)]
    pub async fn assign_permissions(&self, role_id: RoleId, permissions: PermissionSet) -> Result<PermissionSet, AccessError> {
        if let Some(set) = permissions.explicit_permissions() {
            for permission in set {
                permission.validate()?;
            }
        }
        Ok(self.store.replace_role_permissions(role_id, &permissions).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn revoke_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<(), AccessError> {
        Ok(self.store.unlink_permission(role_id, permission_id).await?)
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    #[instrument(skip(self, input), fields(permission = %input.name), err)]
    pub async fn create_permission(&self, input: NewPermission) -> Result<PermissionDefinition, AccessError> {
        input.validate()?;
        let permission = self
            .store
            .insert_permission(input.into_definition(PermissionId::new(), Utc::now()))
            .await?;
        info!(permission_id = %permission.id, "permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: PermissionId) -> Result<PermissionDefinition, AccessError> {
        self.store.get_permission(id).await?.ok_or(AccessError::NotFound)
    }

    pub async fn list_permissions(&self) -> Result<Vec<PermissionDefinition>, AccessError> {
        Ok(self.store.list_permissions().await?)
    }

    #[instrument(skip(self, update), err)]
    pub async fn update_permission(&self, id: PermissionId, update: PermissionUpdate) -> Result<PermissionDefinition, AccessError> {
        update.validate()?;
        let mut permission = self.get_permission(id).await?;
        update.apply(&mut permission);
        self.store.update_permission(&permission).await?;
        Ok(permission)
    }

    /// Deletes the permission and unlinks it from every role.
    #[instrument(skip(self), err)]
    pub async fn delete_permission(&self, id: PermissionId) -> Result<(), AccessError> {
        self.store.delete_permission(id).await?;
        info!(permission_id = %id, "permission deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use platform_auth::catalog::{EDIT_USERS, VIEW_USERS};
    use platform_auth::{Permission, RoleName};

    use super::*;
    use crate::testing::Fixture;

    fn new_role(name: &'static str) -> NewRole {
        NewRole {
            name: RoleName::from_static(name),
            display_name: name.to_lowercase(),
            description: None,
        }
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let fx = Fixture::seeded().await;
        fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        assert!(matches!(
            fx.admin.create_role(new_role("SUPPORT")).await,
            Err(AccessError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn invalid_role_name_is_rejected() {
        let fx = Fixture::seeded().await;
        assert!(matches!(
            fx.admin.create_role(new_role("not valid!")).await,
            Err(AccessError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn assign_replaces_whole_set_idempotently() {
        let fx = Fixture::seeded().await;
        let role = fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        let set = PermissionSet::explicit([VIEW_USERS, EDIT_USERS]);

        fx.admin.assign_permissions(role.id, set.clone()).await.unwrap();
        fx.admin.assign_permissions(role.id, set.clone()).await.unwrap();
        assert_eq!(fx.admin.role_permissions(role.id).await.unwrap(), set);

        let narrowed = PermissionSet::explicit([VIEW_USERS]);
        fx.admin.assign_permissions(role.id, narrowed.clone()).await.unwrap();
        assert_eq!(fx.admin.role_permissions(role.id).await.unwrap(), narrowed);
    }

    #[tokio::test]
    async fn assign_with_unknown_permission_keeps_prior_set() {
        let fx = Fixture::seeded().await;
        let role = fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        let prior = PermissionSet::explicit([VIEW_USERS]);
        fx.admin.assign_permissions(role.id, prior.clone()).await.unwrap();

        let bogus = PermissionSet::explicit([EDIT_USERS, Permission::from_static("fly_drones")]);
        assert!(matches!(
            fx.admin.assign_permissions(role.id, bogus).await,
            Err(AccessError::Validation(_))
        ));
        assert_eq!(fx.admin.role_permissions(role.id).await.unwrap(), prior);
    }

    #[tokio::test]
    async fn delete_role_in_use_fails_then_succeeds_once_unused() {
        let fx = Fixture::seeded().await;
        let role = fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        fx.principal_with_role(&role.name, Some(fx.tenant)).await;

        match fx.admin.delete_role(role.id).await {
            Err(AccessError::RoleInUse { role: name, principals }) => {
                assert_eq!(name, "SUPPORT");
                assert_eq!(principals, 1);
            }
            other => panic!("expected RoleInUse, got {other:?}"),
        }

        let unused = fx.admin.create_role(new_role("TEMP")).await.unwrap();
        fx.admin.delete_role(unused.id).await.unwrap();
        assert_eq!(fx.admin.get_role(unused.id).await, Err(AccessError::NotFound));
    }

    #[tokio::test]
    async fn global_scope_role_cannot_be_deleted_and_moves_atomically() {
        let fx = Fixture::seeded().await;
        let root = fx.store.find_role(&RoleName::from_static("SUPER_ADMIN")).await.unwrap().unwrap();
        assert!(matches!(fx.admin.delete_role(root.id).await, Err(AccessError::Conflict(_))));

        let ops = fx.admin.create_role(new_role("PLATFORM_OPS")).await.unwrap();
        let designated = fx.admin.designate_global_scope(ops.id).await.unwrap();
        assert!(designated.global_scope);

        let globals: Vec<_> = fx
            .admin
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.global_scope)
            .collect();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].id, ops.id);
    }

    #[tokio::test]
    async fn update_role_keeps_name() {
        let fx = Fixture::seeded().await;
        let role = fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        let updated = fx
            .admin
            .update_role(
                role.id,
                RoleUpdate {
                    display_name: Some("Support desk".to_string()),
                    description: Some("Tier 1".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, role.name);
        assert_eq!(fx.admin.get_role(role.id).await.unwrap().display_name, "Support desk");
    }

    #[tokio::test]
    async fn revoke_unlinked_permission_is_not_found() {
        let fx = Fixture::seeded().await;
        let role = fx.admin.create_role(new_role("SUPPORT")).await.unwrap();
        let view_users = fx.store.find_permission(&VIEW_USERS).await.unwrap().unwrap();

        assert_eq!(
            fx.admin.revoke_permission(role.id, view_users.id).await,
            Err(AccessError::NotFound)
        );

        fx.admin
            .assign_permissions(role.id, PermissionSet::explicit([VIEW_USERS]))
            .await
            .unwrap();
        fx.admin.revoke_permission(role.id, view_users.id).await.unwrap();
        assert_eq!(fx.admin.role_permissions(role.id).await.unwrap(), PermissionSet::default());

        // The wildcard role has no explicit link to revoke.
        let root = fx.store.find_role(&RoleName::from_static("SUPER_ADMIN")).await.unwrap().unwrap();
        assert_eq!(
            fx.admin.revoke_permission(root.id, view_users.id).await,
            Err(AccessError::NotFound)
        );
        assert_eq!(fx.admin.role_permissions(root.id).await.unwrap(), PermissionSet::All);
    }
}
