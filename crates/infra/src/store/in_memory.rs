use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use platform_auth::{
    AccessGrant, EntityType, ListQuery, Permission, PermissionDefinition, PermissionSet, Role, RoleGrant, RoleName,
    TenantPredicate,
};
use platform_core::{PermissionId, PrincipalId, RecordId, RoleId, Tenant, TenantId};

use super::{
    PrincipalDirectory, PrincipalPatch, PrincipalRecord, PrincipalScope, PrincipalView, RbacStore, RecordPatch,
    RecordStore, StoredRecord,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, PermissionDefinition>,
    tenants: HashMap<TenantId, Tenant>,
    principals: HashMap<PrincipalId, PrincipalRecord>,
    records: HashMap<RecordId, StoredRecord>,
}

impl State {
    fn is_defined(&self, name: &Permission) -> bool {
        self.permissions.values().any(|p| &p.name == name)
    }

    fn undefined_in(&self, set: &PermissionSet) -> Vec<String> {
        set.explicit_permissions()
            .map(|names| {
                names
                    .iter()
                    .filter(|name| !self.is_defined(name))
                    .map(|name| name.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn in_scope(&self, principal: &PrincipalRecord, scope: PrincipalScope) -> bool {
        scope.predicate.admits(principal.tenant_id)
            && (scope.include_global_scope
                || !self.roles.get(&principal.role_id).is_some_and(|r| r.global_scope))
    }

    fn check_tenant(&self, tenant_id: Option<TenantId>) -> StoreResult<()> {
        match tenant_id {
            Some(id) if !self.tenants.contains_key(&id) => {
                Err(StoreError::validation(format!("tenant {id} does not exist")))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory store for tests/dev.
///
/// All state sits behind one `RwLock`, so every mutation (including a full
/// permission-set replacement) is observed atomically by readers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store is offline"));
        }
        self.inner.read().map_err(|_| StoreError::poisoned())
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store is offline"));
        }
        self.inner.write().map_err(|_| StoreError::poisoned())
    }
}

#[async_trait]
impl RbacStore for InMemoryStore {
    async fn access_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<AccessGrant> {
        let state = self.read()?;
        Ok(AccessGrant {
            permission_defined: state.is_defined(permission),
            role: state.roles.get(&role_id).map(|role| RoleGrant {
                role: role.to_ref(),
                global_scope: role.global_scope,
                permissions: role.permissions.clone(),
            }),
        })
    }

    async fn insert_role(&self, role: Role) -> StoreResult<Role> {
        let mut state = self.write()?;
        if state.roles.contains_key(&role.id) || state.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::conflict(format!("role '{}' already exists", role.name)));
        }
        if role.global_scope && state.roles.values().any(|r| r.global_scope) {
            return Err(StoreError::conflict("a global-scope role already exists"));
        }
        let undefined = state.undefined_in(&role.permissions);
        if !undefined.is_empty() {
            return Err(StoreError::validation(format!(
                "undefined permissions: {}",
                undefined.join(", ")
            )));
        }
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_role(&self, name: &RoleName) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.values().find(|r| &r.name == name).cloned())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.read()?.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(roles)
    }

    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.roles.get_mut(&role.id).ok_or(StoreError::NotFound)?;
        stored.display_name = role.display_name.clone();
        stored.description = role.description.clone();
        stored.updated_at = role.updated_at;
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        let mut state = self.write()?;
        let role = state.roles.get(&id).ok_or(StoreError::NotFound)?;
        if role.global_scope {
            return Err(StoreError::conflict(format!(
                "role '{}' is the global-scope role and cannot be deleted",
                role.name
            )));
        }
        let principals = state.principals.values().filter(|p| p.role_id == id).count() as u64;
        if principals > 0 {
            return Err(StoreError::RoleInUse {
                role: role.name.to_string(),
                principals,
            });
        }
        state.roles.remove(&id);
        Ok(())
    }

    async fn set_global_scope(&self, id: RoleId) -> StoreResult<Role> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        let mut designated = None;
        for role in state.roles.values_mut() {
            let target = role.id == id;
            if role.global_scope != target {
                role.global_scope = target;
                role.updated_at = now;
            }
            if target {
                designated = Some(role.clone());
            }
        }
        designated.ok_or(StoreError::NotFound)
    }

    async fn replace_role_permissions(&self, role_id: RoleId, permissions: &PermissionSet) -> StoreResult<PermissionSet> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound);
        }
        let undefined = state.undefined_in(permissions);
        if !undefined.is_empty() {
            return Err(StoreError::validation(format!(
                "undefined permissions: {}",
                undefined.join(", ")
            )));
        }
        let role = state.roles.get_mut(&role_id).ok_or(StoreError::NotFound)?;
        role.permissions = permissions.clone();
        role.updated_at = Utc::now();
        Ok(role.permissions.clone())
    }

    async fn unlink_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()> {
        let mut state = self.write()?;
        let name = state
            .permissions
            .get(&permission_id)
            .map(|p| p.name.clone())
            .ok_or(StoreError::NotFound)?;
        let role = state.roles.get_mut(&role_id).ok_or(StoreError::NotFound)?;
        let removed = match &mut role.permissions {
            PermissionSet::Explicit(set) => set.remove(&name),
            PermissionSet::All => false,
        };
        if !removed {
            return Err(StoreError::NotFound);
        }
        role.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<PermissionDefinition> {
        let mut state = self.write()?;
        if state.permissions.contains_key(&permission.id) || state.is_defined(&permission.name) {
            return Err(StoreError::conflict(format!(
                "permission '{}' already exists",
                permission.name
            )));
        }
        state.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    async fn find_permission(&self, name: &Permission) -> StoreResult<Option<PermissionDefinition>> {
        Ok(self.read()?.permissions.values().find(|p| &p.name == name).cloned())
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>> {
        let mut permissions: Vec<PermissionDefinition> = self.read()?.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn update_permission(&self, permission: &PermissionDefinition) -> StoreResult<()> {
        let mut state = self.write()?;
        let stored = state.permissions.get_mut(&permission.id).ok_or(StoreError::NotFound)?;
        stored.display_name = permission.display_name.clone();
        stored.description = permission.description.clone();
        Ok(())
    }

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<()> {
        let mut state = self.write()?;
        let removed = state.permissions.remove(&id).ok_or(StoreError::NotFound)?;
        for role in state.roles.values_mut() {
            if let PermissionSet::Explicit(set) = &mut role.permissions {
                set.remove(&removed.name);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryStore {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut state = self.write()?;
        if state.tenants.contains_key(&tenant.id) {
            return Err(StoreError::conflict(format!("tenant {} already exists", tenant.id)));
        }
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }

    async fn insert_principal(&self, principal: PrincipalRecord) -> StoreResult<PrincipalRecord> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&principal.role_id) {
            return Err(StoreError::validation(format!("role {} does not exist", principal.role_id)));
        }
        state.check_tenant(principal.tenant_id)?;
        let duplicate = state.principals.values().any(|p| {
            p.id == principal.id || p.email.eq_ignore_ascii_case(&principal.email)
        });
        if duplicate {
            return Err(StoreError::conflict(format!(
                "principal '{}' already exists",
                principal.email
            )));
        }
        state.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn resolve_principal(&self, id: PrincipalId) -> StoreResult<Option<PrincipalView>> {
        let state = self.read()?;
        let Some(record) = state.principals.get(&id) else {
            return Ok(None);
        };
        Ok(state.roles.get(&record.role_id).map(|role| PrincipalView {
            record: record.clone(),
            role: role.to_ref(),
            global_scope: role.global_scope,
        }))
    }

    async fn get_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<Option<PrincipalRecord>> {
        Ok(self
            .read()?
            .principals
            .get(&id)
            .filter(|p| predicate.admits(p.tenant_id))
            .cloned())
    }

    async fn update_principal(
        &self,
        id: PrincipalId,
        predicate: TenantPredicate,
        patch: &PrincipalPatch,
    ) -> StoreResult<Option<PrincipalRecord>> {
        let mut state = self.write()?;
        if let Some(role_id) = patch.role_id {
            if !state.roles.contains_key(&role_id) {
                return Err(StoreError::validation(format!("role {role_id} does not exist")));
            }
        }
        let Some(record) = state.principals.get_mut(&id).filter(|p| predicate.admits(p.tenant_id)) else {
            return Ok(None);
        };
        patch.apply(record, Utc::now());
        Ok(Some(record.clone()))
    }

    async fn delete_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<bool> {
        let mut state = self.write()?;
        let found = state.principals.get(&id).is_some_and(|p| predicate.admits(p.tenant_id));
        if found {
            state.principals.remove(&id);
        }
        Ok(found)
    }

    async fn list_principals(&self, scope: PrincipalScope, offset: u32, limit: u32) -> StoreResult<Vec<PrincipalRecord>> {
        let state = self.read()?;
        let mut rows: Vec<PrincipalRecord> = state
            .principals
            .values()
            .filter(|p| state.in_scope(p, scope))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows.into_iter().skip(offset as usize).take(limit as usize).collect())
    }

    async fn count_principals(&self, scope: PrincipalScope) -> StoreResult<u64> {
        let state = self.read()?;
        Ok(state.principals.values().filter(|p| state.in_scope(p, scope)).count() as u64)
    }
}

fn visible(record: &StoredRecord, entity: &EntityType, predicate: TenantPredicate) -> bool {
    record.entity == entity.name && predicate.admits(record.tenant_id)
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_records(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        query: &ListQuery,
    ) -> StoreResult<Vec<StoredRecord>> {
        let state = self.read()?;
        let mut rows: Vec<StoredRecord> = state
            .records
            .values()
            .filter(|r| visible(r, entity, predicate) && r.matches(&query.filters))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn get_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
    ) -> StoreResult<Option<StoredRecord>> {
        Ok(self
            .read()?
            .records
            .get(&id)
            .filter(|r| visible(r, entity, predicate))
            .cloned())
    }

    async fn insert_record(&self, record: StoredRecord) -> StoreResult<StoredRecord> {
        let mut state = self.write()?;
        if state.records.contains_key(&record.id) {
            return Err(StoreError::conflict(format!("record {} already exists", record.id)));
        }
        state.check_tenant(record.tenant_id)?;
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
        patch: &RecordPatch,
    ) -> StoreResult<Option<StoredRecord>> {
        let mut state = self.write()?;
        state.check_tenant(patch.tenant_id)?;
        let Some(record) = state.records.get_mut(&id).filter(|r| visible(r, entity, predicate)) else {
            return Ok(None);
        };
        for (key, value) in &patch.fields {
            record.data.insert(key.clone(), value.clone());
        }
        if let Some(tenant_id) = patch.tenant_id {
            record.tenant_id = Some(tenant_id);
        }
        record.updated_at = patch.updated_at;
        Ok(Some(record.clone()))
    }

    async fn delete_record(&self, entity: &'static EntityType, predicate: TenantPredicate, id: RecordId) -> StoreResult<bool> {
        let mut state = self.write()?;
        let found = state.records.get(&id).is_some_and(|r| visible(r, entity, predicate));
        if found {
            state.records.remove(&id);
        }
        Ok(found)
    }
}
