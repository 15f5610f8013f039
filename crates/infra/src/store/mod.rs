//! Storage abstractions for the authorization core.
//!
//! Every trait is object-safe (`async_trait`) so services hold
//! `Arc<dyn ...>` and the backend is chosen at startup.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use platform_auth::{
    AccessGrant, EntityType, JsonMap, ListQuery, Permission, PermissionDefinition, PermissionSet, Role,
    RoleName, RoleRef, TenantPredicate,
};
use platform_core::{PermissionId, PrincipalId, RecordId, RoleId, Tenant, TenantId};

use crate::error::StoreResult;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Role registry and permission table.
#[async_trait]
pub trait RbacStore: Send + Sync {
    /// One round trip: whether `permission` is defined, plus the current
    /// grant of `role_id` (absent if the role does not exist).
    async fn access_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<AccessGrant>;

    async fn insert_role(&self, role: Role) -> StoreResult<Role>;
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>>;
    async fn find_role(&self, name: &RoleName) -> StoreResult<Option<Role>>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    /// Persist display name, description and `updated_at`. Name and grants
    /// are not touched.
    async fn update_role(&self, role: &Role) -> StoreResult<()>;
    /// Fails with `RoleInUse` while principals reference the role and with
    /// `Conflict` for the global-scope role.
    async fn delete_role(&self, id: RoleId) -> StoreResult<()>;
    /// Atomically move the single global-scope flag onto `id`.
    async fn set_global_scope(&self, id: RoleId) -> StoreResult<Role>;

    /// Replace the role's whole permission set. Unknown identifiers reject the
    /// call with `Validation` and leave the previous set intact.
    async fn replace_role_permissions(&self, role_id: RoleId, permissions: &PermissionSet) -> StoreResult<PermissionSet>;
    /// Remove one explicit link; `NotFound` if it was not linked.
    async fn unlink_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()>;

    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<PermissionDefinition>;
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>>;
    async fn find_permission(&self, name: &Permission) -> StoreResult<Option<PermissionDefinition>>;
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>>;
    async fn update_permission(&self, permission: &PermissionDefinition) -> StoreResult<()>;
    /// Removes the permission and every role link to it in one unit.
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<()>;
}

/// A principal row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub id: PrincipalId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub full_name: Option<String>,
    pub role_id: RoleId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrincipalRecord {
    pub fn new(tenant_id: Option<TenantId>, email: impl Into<String>, role_id: RoleId) -> Self {
        let now = Utc::now();
        Self {
            id: PrincipalId::new(),
            tenant_id,
            email: email.into(),
            full_name: None,
            role_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Principal joined with its role, as needed for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalView {
    pub record: PrincipalRecord,
    pub role: RoleRef,
    pub global_scope: bool,
}

/// Administrative change to a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalPatch {
    pub role_id: Option<RoleId>,
    pub is_active: Option<bool>,
    pub full_name: Option<String>,
}

impl PrincipalPatch {
    pub fn is_empty(&self) -> bool {
        self.role_id.is_none() && self.is_active.is_none() && self.full_name.is_none()
    }

    pub fn apply(&self, record: &mut PrincipalRecord, now: DateTime<Utc>) {
        if let Some(role_id) = self.role_id {
            record.role_id = role_id;
        }
        if let Some(is_active) = self.is_active {
            record.is_active = is_active;
        }
        if let Some(full_name) = &self.full_name {
            record.full_name = Some(full_name.clone());
        }
        record.updated_at = now;
    }
}

/// Tenants and principals. Provisioning happens outside the core; the core
/// only reads, except for the user administration surface.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant>;
    async fn get_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>>;

    /// The role must exist; email must be unique.
    async fn insert_principal(&self, principal: PrincipalRecord) -> StoreResult<PrincipalRecord>;
    async fn resolve_principal(&self, id: PrincipalId) -> StoreResult<Option<PrincipalView>>;
    /// Fetch a principal constrained by `predicate` on its tenant.
    async fn get_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<Option<PrincipalRecord>>;
    /// Apply `patch` to a principal constrained by `predicate`. `None` when no
    /// row matches.
    async fn update_principal(
        &self,
        id: PrincipalId,
        predicate: TenantPredicate,
        patch: &PrincipalPatch,
    ) -> StoreResult<Option<PrincipalRecord>>;
    /// `true` if a row matching `predicate` was deleted.
    async fn delete_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<bool>;

    /// Page of principals in `scope`, oldest first.
    async fn list_principals(&self, scope: PrincipalScope, offset: u32, limit: u32) -> StoreResult<Vec<PrincipalRecord>>;
    async fn count_principals(&self, scope: PrincipalScope) -> StoreResult<u64>;
}

/// Which principals a directory listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalScope {
    pub predicate: TenantPredicate,
    /// Whether holders of the global-scope role are included.
    pub include_global_scope: bool,
}

/// A generic tenant-scoped data row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub entity: String,
    pub tenant_id: Option<TenantId>,
    pub data: JsonMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Flat JSON rendering: payload fields plus id, tenant and timestamps.
    pub fn to_json(&self) -> Value {
        let mut out = self.data.clone();
        out.insert("id".to_string(), Value::String(self.id.to_string()));
        if let Some(tenant_id) = self.tenant_id {
            out.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
        }
        out.insert("created_at".to_string(), Value::String(self.created_at.to_rfc3339()));
        out.insert("updated_at".to_string(), Value::String(self.updated_at.to_rfc3339()));
        Value::Object(out)
    }

    /// Whether every filter entry equals the corresponding payload field.
    /// Arrays and objects compare whole, not by containment.
    pub fn matches(&self, filters: &JsonMap) -> bool {
        filters.iter().all(|(k, v)| self.data.get(k) == Some(v))
    }
}

/// Changes applied by a scoped update.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    /// Fields merged into the payload (shallow).
    pub fields: JsonMap,
    /// New tenant; `None` leaves it unchanged.
    pub tenant_id: Option<TenantId>,
    pub updated_at: DateTime<Utc>,
}

/// Generic record storage. Every call that locates rows takes the tenant
/// predicate and applies it in the same lookup.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        query: &ListQuery,
    ) -> StoreResult<Vec<StoredRecord>>;

    async fn get_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
    ) -> StoreResult<Option<StoredRecord>>;

    /// A `tenant_id` that names no tenant is a `Validation` error.
    async fn insert_record(&self, record: StoredRecord) -> StoreResult<StoredRecord>;

    async fn update_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
        patch: &RecordPatch,
    ) -> StoreResult<Option<StoredRecord>>;

    /// `true` if a row was deleted.
    async fn delete_record(&self, entity: &'static EntityType, predicate: TenantPredicate, id: RecordId) -> StoreResult<bool>;
}
