//! Postgres-backed stores.
//!
//! One `PostgresStore` implements all three storage traits over a shared
//! pool. Every value is a bound parameter; the only SQL assembled at runtime
//! is the concatenation of fixed column lists with fixed `WHERE` clauses.
//!
//! ## Tenant Isolation
//!
//! Scoped lookups bind the tenant predicate as `$n::uuid` and filter with
//! `($n IS NULL OR tenant_id = $n)`, so the predicate is evaluated by the
//! same statement that locates the row.
//!
//! ## Atomicity
//!
//! Role deletion, permission deletion, global-scope designation and permission
//! set replacement each run in one transaction. A failed step rolls the whole
//! change back.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use platform_auth::{
    AccessGrant, EntityType, JsonMap, ListQuery, Permission, PermissionDefinition, PermissionSet, Role, RoleGrant,
    RoleName, RoleRef, TenantPredicate,
};
use platform_core::{PermissionId, PrincipalId, RecordId, RoleId, Tenant, TenantId, TenantStatus};

use super::{
    PrincipalDirectory, PrincipalPatch, PrincipalRecord, PrincipalScope, PrincipalView, RbacStore, RecordPatch,
    RecordStore, StoredRecord,
};
use crate::error::{FOREIGN_KEY_VIOLATION, StoreError, StoreResult, is_violation, map_sqlx_error};

const SCHEMA: &str = include_str!("../../migrations/0001_authorization.sql");

const ROLE_SELECT: &str = r#"
    SELECT
        r.id,
        r.name,
        r.display_name,
        r.description,
        r.wildcard,
        r.global_scope,
        r.created_at,
        r.updated_at,
        ARRAY(
            SELECT p.name::TEXT
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = r.id
            ORDER BY p.name
        ) AS permissions
    FROM roles r
"#;

const PERMISSION_SELECT: &str = r#"
    SELECT id, name, display_name, resource, action, description, created_at
    FROM permissions
"#;

const PRINCIPAL_COLUMNS: &str = "id, tenant_id, email, full_name, role_id, is_active, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, entity_type, tenant_id, data, created_at, updated_at";

/// Tenant predicate (`$1`) and global-scope visibility (`$2`) over `principals p`.
const PRINCIPAL_SCOPE: &str = r#"
    ($1::uuid IS NULL OR p.tenant_id = $1)
    AND ($2 OR NOT EXISTS (
        SELECT 1 FROM roles r WHERE r.id = p.role_id AND r.global_scope
    ))
"#;

/// Postgres-backed role registry, principal directory and record store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect with a bounded acquire timeout; a slow database surfaces as
    /// `Unavailable` rather than a hung request.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn rollback(tx: Transaction<'_, Postgres>, err: StoreError) -> StoreError {
    match tx.rollback().await {
        Ok(()) => err,
        Err(e) => map_sqlx_error("rollback", e),
    }
}

fn tenant_bind(predicate: TenantPredicate) -> Option<Uuid> {
    predicate.as_bind().map(|t| *t.as_uuid())
}

/// Replace the stored grant of `role_id` inside `tx`.
async fn write_permission_set(
    tx: &mut Transaction<'_, Postgres>,
    role_id: RoleId,
    permissions: &PermissionSet,
) -> StoreResult<()> {
    let names: Vec<String> = permissions
        .explicit_permissions()
        .map(|set| set.iter().map(|p| p.as_str().to_string()).collect())
        .unwrap_or_default();

    let rows = sqlx::query("SELECT id, name::TEXT AS name FROM permissions WHERE name = ANY($1)")
        .bind(&names)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("resolve_permission_names", e))?;

    let mut ids = Vec::with_capacity(rows.len());
    let mut found = BTreeSet::new();
    for row in rows {
        ids.push(row.try_get::<Uuid, _>("id").map_err(|e| map_sqlx_error("decode_permission", e))?);
        found.insert(row.try_get::<String, _>("name").map_err(|e| map_sqlx_error("decode_permission", e))?);
    }
    let undefined: Vec<&str> = names
        .iter()
        .filter(|n| !found.contains(*n))
        .map(String::as_str)
        .collect();
    if !undefined.is_empty() {
        return Err(StoreError::validation(format!(
            "undefined permissions: {}",
            undefined.join(", ")
        )));
    }

    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("clear_role_permissions", e))?;

    sqlx::query("UPDATE roles SET wildcard = $2, updated_at = NOW() WHERE id = $1")
        .bind(role_id.as_uuid())
        .bind(permissions.is_wildcard())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_role_wildcard", e))?;

    if !ids.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, UNNEST($2::uuid[])
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(&ids)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role_permissions", e))?;
    }

    Ok(())
}

#[async_trait]
impl RbacStore for PostgresStore {
    #[instrument(skip(self), fields(role_id = %role_id, permission = %permission), err)]
    async fn access_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<AccessGrant> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM permissions WHERE name = $2) AS permission_defined,
                r.id AS role_id,
                r.name::TEXT AS role_name,
                r.wildcard,
                r.global_scope,
                ARRAY(
                    SELECT p.name::TEXT
                    FROM role_permissions rp
                    JOIN permissions p ON p.id = rp.permission_id
                    WHERE rp.role_id = r.id
                ) AS permissions
            FROM (SELECT 1) AS anchor
            LEFT JOIN roles r ON r.id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(permission.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("access_grant", e))?;

        let decode = |e| map_sqlx_error("decode_access_grant", e);
        let permission_defined: bool = row.try_get("permission_defined").map_err(decode)?;
        let found: Option<Uuid> = row.try_get("role_id").map_err(decode)?;

        let role = match found {
            None => None,
            Some(id) => {
                let name: String = row.try_get("role_name").map_err(decode)?;
                let wildcard: bool = row.try_get("wildcard").map_err(decode)?;
                let global_scope: bool = row.try_get("global_scope").map_err(decode)?;
                let names: Vec<String> = row.try_get("permissions").map_err(decode)?;
                Some(RoleGrant {
                    role: RoleRef {
                        id: RoleId::from_uuid(id),
                        name: RoleName::new(name),
                    },
                    global_scope,
                    permissions: permission_set(wildcard, names),
                })
            }
        };

        Ok(AccessGrant {
            permission_defined,
            role,
        })
    }

    #[instrument(skip(self, role), fields(role = %role.name), err)]
    async fn insert_role(&self, role: Role) -> StoreResult<Role> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, display_name, description, wildcard, global_scope, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.name.as_str())
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.permissions.is_wildcard())
        .bind(role.global_scope)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        if let Err(err) = write_permission_set(&mut tx, role.id, &role.permissions).await {
            return Err(rollback(tx, err).await);
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let row = sqlx::query(&format!("{ROLE_SELECT} WHERE r.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.map(|r| decode_role(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_role(&self, name: &RoleName) -> StoreResult<Option<Role>> {
        let row = sqlx::query(&format!("{ROLE_SELECT} WHERE r.name = $1"))
            .bind(name.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;
        row.map(|r| decode_role(&r)).transpose()
    }

    #[instrument(skip(self), fields(role_count = field::Empty), err)]
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query(&format!("{ROLE_SELECT} ORDER BY r.name"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        Span::current().record("role_count", rows.len());
        rows.iter().map(decode_role).collect()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET display_name = $2, description = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        let row = sqlx::query("SELECT name::TEXT AS name, global_scope FROM roles WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_role", e))?;
        let Some(row) = row else {
            return Err(rollback(tx, StoreError::NotFound).await);
        };
        let name: String = row.try_get("name").map_err(|e| map_sqlx_error("decode_role", e))?;
        let global_scope: bool = row
            .try_get("global_scope")
            .map_err(|e| map_sqlx_error("decode_role", e))?;

        if global_scope {
            let err = StoreError::conflict(format!("role '{name}' is the global-scope role and cannot be deleted"));
            return Err(rollback(tx, err).await);
        }

        let principals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principals WHERE role_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_role_principals", e))?;
        if principals > 0 {
            let err = StoreError::RoleInUse {
                role: name,
                principals: principals as u64,
            };
            return Err(rollback(tx, err).await);
        }

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn set_global_scope(&self, id: RoleId) -> StoreResult<Role> {
        let mut tx = self.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM roles WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_role", e))?;
        if exists.is_none() {
            return Err(rollback(tx, StoreError::NotFound).await);
        }

        sqlx::query("UPDATE roles SET global_scope = FALSE, updated_at = NOW() WHERE global_scope AND id <> $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_global_scope", e))?;

        sqlx::query("UPDATE roles SET global_scope = TRUE, updated_at = NOW() WHERE id = $1 AND NOT global_scope")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_global_scope", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        self.get_role(id).await?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, permissions), err)]
    async fn replace_role_permissions(&self, role_id: RoleId, permissions: &PermissionSet) -> StoreResult<PermissionSet> {
        let mut tx = self.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_role", e))?;
        if exists.is_none() {
            return Err(rollback(tx, StoreError::NotFound).await);
        }

        if let Err(err) = write_permission_set(&mut tx, role_id, permissions).await {
            return Err(rollback(tx, err).await);
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(permissions.clone())
    }

    #[instrument(skip(self), err)]
    async fn unlink_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
            .bind(role_id.as_uuid())
            .bind(permission_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("unlink_permission", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, permission), fields(permission = %permission.name), err)]
    async fn insert_permission(&self, permission: PermissionDefinition) -> StoreResult<PermissionDefinition> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, display_name, resource, action, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.name.as_str())
        .bind(&permission.display_name)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(&permission.description)
        .bind(permission.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;

        Ok(permission)
    }

    #[instrument(skip(self), err)]
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<PermissionDefinition>> {
        let row = sqlx::query_as::<_, PermissionRow>(&format!("{PERMISSION_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permission", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), err)]
    async fn find_permission(&self, name: &Permission) -> StoreResult<Option<PermissionDefinition>> {
        let row = sqlx::query_as::<_, PermissionRow>(&format!("{PERMISSION_SELECT} WHERE name = $1"))
            .bind(name.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_permission", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(permission_count = field::Empty), err)]
    async fn list_permissions(&self) -> StoreResult<Vec<PermissionDefinition>> {
        let rows = sqlx::query_as::<_, PermissionRow>(&format!("{PERMISSION_SELECT} ORDER BY name"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        Span::current().record("permission_count", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, permission), fields(permission_id = %permission.id), err)]
    async fn update_permission(&self, permission: &PermissionDefinition) -> StoreResult<()> {
        let result = sqlx::query("UPDATE permissions SET display_name = $2, description = $3 WHERE id = $1")
            .bind(permission.id.as_uuid())
            .bind(&permission.display_name)
            .bind(&permission.description)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_permission", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("unlink_permission_everywhere", e))?;

        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;
        if result.rows_affected() == 0 {
            return Err(rollback(tx, StoreError::NotFound).await);
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}

#[async_trait]
impl PrincipalDirectory for PostgresStore {
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        sqlx::query("INSERT INTO tenants (id, name, status, created_at) VALUES ($1, $2, $3, $4)")
            .bind(tenant.id.as_uuid())
            .bind(&tenant.name)
            .bind(tenant.status.as_str())
            .bind(tenant.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(tenant)
    }

    #[instrument(skip(self), err)]
    async fn get_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query("SELECT id, name, status, created_at FROM tenants WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e| map_sqlx_error("decode_tenant", e);
        let status: String = row.try_get("status").map_err(decode)?;
        Ok(Some(Tenant {
            id: TenantId::from_uuid(row.try_get("id").map_err(decode)?),
            name: row.try_get("name").map_err(decode)?,
            status: status
                .parse::<TenantStatus>()
                .map_err(|e| StoreError::unavailable(format!("corrupt tenant row: {e}")))?,
            created_at: row.try_get("created_at").map_err(decode)?,
        }))
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id), err)]
    async fn insert_principal(&self, principal: PrincipalRecord) -> StoreResult<PrincipalRecord> {
        sqlx::query(&format!(
            "INSERT INTO principals ({PRINCIPAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(principal.id.as_uuid())
        .bind(principal.tenant_id.map(|t| *t.as_uuid()))
        .bind(&principal.email)
        .bind(&principal.full_name)
        .bind(principal.role_id.as_uuid())
        .bind(principal.is_active)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                StoreError::validation("principal references an unknown role or tenant")
            } else {
                map_sqlx_error("insert_principal", e)
            }
        })?;
        Ok(principal)
    }

    #[instrument(skip(self), err)]
    async fn resolve_principal(&self, id: PrincipalId) -> StoreResult<Option<PrincipalView>> {
        let row = sqlx::query(
            r#"
            SELECT
                p.id, p.tenant_id, p.email, p.full_name, p.role_id, p.is_active, p.created_at, p.updated_at,
                r.name::TEXT AS role_name,
                r.global_scope
            FROM principals p
            JOIN roles r ON r.id = p.role_id
            WHERE p.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve_principal", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e| map_sqlx_error("decode_principal", e);
        let record: PrincipalRecord = PrincipalRow::from_row(&row).map_err(decode)?.into();
        let role_name: String = row.try_get("role_name").map_err(decode)?;
        let global_scope: bool = row.try_get("global_scope").map_err(decode)?;

        Ok(Some(PrincipalView {
            role: RoleRef {
                id: record.role_id,
                name: RoleName::new(role_name),
            },
            global_scope,
            record,
        }))
    }

    #[instrument(skip(self), err)]
    async fn get_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<Option<PrincipalRecord>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1 AND ($2::uuid IS NULL OR tenant_id = $2)"
        ))
        .bind(id.as_uuid())
        .bind(tenant_bind(predicate))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_principal", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), err)]
    async fn update_principal(
        &self,
        id: PrincipalId,
        predicate: TenantPredicate,
        patch: &PrincipalPatch,
    ) -> StoreResult<Option<PrincipalRecord>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            UPDATE principals
            SET role_id = COALESCE($3, role_id),
                is_active = COALESCE($4, is_active),
                full_name = COALESCE($5, full_name),
                updated_at = NOW()
            WHERE id = $1 AND ($2::uuid IS NULL OR tenant_id = $2)
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(tenant_bind(predicate))
        .bind(patch.role_id.map(|r| *r.as_uuid()))
        .bind(patch.is_active)
        .bind(&patch.full_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                StoreError::validation("principal references an unknown role")
            } else {
                map_sqlx_error("update_principal", e)
            }
        })?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), err)]
    async fn delete_principal(&self, id: PrincipalId, predicate: TenantPredicate) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM principals WHERE id = $1 AND ($2::uuid IS NULL OR tenant_id = $2)")
            .bind(id.as_uuid())
            .bind(tenant_bind(predicate))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_principal", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(row_count = field::Empty), err)]
    async fn list_principals(&self, scope: PrincipalScope, offset: u32, limit: u32) -> StoreResult<Vec<PrincipalRecord>> {
        let rows = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            SELECT {PRINCIPAL_COLUMNS}
            FROM principals p
            WHERE {PRINCIPAL_SCOPE}
            ORDER BY created_at, id
            OFFSET $3
            LIMIT $4
            "#
        ))
        .bind(tenant_bind(scope.predicate))
        .bind(scope.include_global_scope)
        .bind(i64::from(offset))
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_principals", e))?;

        Span::current().record("row_count", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), err)]
    async fn count_principals(&self, scope: PrincipalScope) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM principals p WHERE {PRINCIPAL_SCOPE}"))
            .bind(tenant_bind(scope.predicate))
            .bind(scope.include_global_scope)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_principals", e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Map a dangling tenant reference on a record write to `Validation`.
fn record_write_error(operation: &str, err: sqlx::Error) -> StoreError {
    if is_violation(&err, FOREIGN_KEY_VIOLATION) {
        StoreError::validation("record references an unknown tenant")
    } else {
        map_sqlx_error(operation, err)
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    #[instrument(skip(self, entity), fields(entity = entity.name, row_count = field::Empty), err)]
    async fn list_records(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        query: &ListQuery,
    ) -> StoreResult<Vec<StoredRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM records
            WHERE entity_type = $1
              AND ($2::uuid IS NULL OR tenant_id = $2)
              AND NOT EXISTS (
                  SELECT 1 FROM jsonb_each($3::jsonb) AS f(key, value)
                  WHERE records.data -> f.key IS DISTINCT FROM f.value
              )
            ORDER BY created_at, id
            OFFSET $4
            LIMIT $5
            "#
        ))
        .bind(entity.name)
        .bind(tenant_bind(predicate))
        .bind(Value::Object(query.filters.clone()))
        .bind(i64::from(query.offset))
        .bind(i64::from(query.limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        Span::current().record("row_count", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, entity), fields(entity = entity.name), err)]
    async fn get_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
    ) -> StoreResult<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM records
            WHERE id = $1 AND entity_type = $2 AND ($3::uuid IS NULL OR tenant_id = $3)
            "#
        ))
        .bind(id.as_uuid())
        .bind(entity.name)
        .bind(tenant_bind(predicate))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_record", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, record), fields(entity = %record.entity, record_id = %record.id), err)]
    async fn insert_record(&self, record: StoredRecord) -> StoreResult<StoredRecord> {
        sqlx::query(&format!(
            "INSERT INTO records ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(record.id.as_uuid())
        .bind(&record.entity)
        .bind(record.tenant_id.map(|t| *t.as_uuid()))
        .bind(Value::Object(record.data.clone()))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| record_write_error("insert_record", e))?;
        Ok(record)
    }

    #[instrument(skip(self, entity, patch), fields(entity = entity.name), err)]
    async fn update_record(
        &self,
        entity: &'static EntityType,
        predicate: TenantPredicate,
        id: RecordId,
        patch: &RecordPatch,
    ) -> StoreResult<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            UPDATE records
            SET data = data || $4,
                tenant_id = COALESCE($5, tenant_id),
                updated_at = $6
            WHERE id = $1 AND entity_type = $2 AND ($3::uuid IS NULL OR tenant_id = $3)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(entity.name)
        .bind(tenant_bind(predicate))
        .bind(Value::Object(patch.fields.clone()))
        .bind(patch.tenant_id.map(|t| *t.as_uuid()))
        .bind(patch.updated_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| record_write_error("update_record", e))?;
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, entity), fields(entity = entity.name), err)]
    async fn delete_record(&self, entity: &'static EntityType, predicate: TenantPredicate, id: RecordId) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM records WHERE id = $1 AND entity_type = $2 AND ($3::uuid IS NULL OR tenant_id = $3)",
        )
        .bind(id.as_uuid())
        .bind(entity.name)
        .bind(tenant_bind(predicate))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_record", e))?;
        Ok(result.rows_affected() > 0)
    }
}

// SQLx row types

fn permission_set(wildcard: bool, names: Vec<String>) -> PermissionSet {
    if wildcard {
        PermissionSet::All
    } else {
        PermissionSet::explicit(names.into_iter().map(Permission::new))
    }
}

fn decode_role(row: &PgRow) -> StoreResult<Role> {
    let decode = |e| map_sqlx_error("decode_role", e);
    let wildcard: bool = row.try_get("wildcard").map_err(decode)?;
    let names: Vec<String> = row.try_get("permissions").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id").map_err(decode)?),
        name: RoleName::new(name),
        display_name: row.try_get("display_name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        permissions: permission_set(wildcard, names),
        global_scope: row.try_get("global_scope").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[derive(Debug)]
struct PermissionRow {
    id: Uuid,
    name: String,
    display_name: String,
    resource: String,
    action: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            resource: row.try_get("resource")?,
            action: row.try_get("action")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<PermissionRow> for PermissionDefinition {
    fn from(row: PermissionRow) -> Self {
        PermissionDefinition {
            id: PermissionId::from_uuid(row.id),
            name: Permission::new(row.name),
            display_name: row.display_name,
            resource: row.resource,
            action: row.action,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct PrincipalRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    email: String,
    full_name: Option<String>,
    role_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PrincipalRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PrincipalRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            role_id: row.try_get("role_id")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<PrincipalRow> for PrincipalRecord {
    fn from(row: PrincipalRow) -> Self {
        PrincipalRecord {
            id: PrincipalId::from_uuid(row.id),
            tenant_id: row.tenant_id.map(TenantId::from_uuid),
            email: row.email,
            full_name: row.full_name,
            role_id: RoleId::from_uuid(row.role_id),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct RecordRow {
    id: Uuid,
    entity_type: String,
    tenant_id: Option<Uuid>,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecordRow {
            id: row.try_get("id")?,
            entity_type: row.try_get("entity_type")?,
            tenant_id: row.try_get("tenant_id")?,
            data: row.try_get("data")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<RecordRow> for StoredRecord {
    fn from(row: RecordRow) -> Self {
        let data = match row.data {
            Value::Object(map) => map,
            _ => JsonMap::new(),
        };
        StoredRecord {
            id: RecordId::from_uuid(row.id),
            entity: row.entity_type,
            tenant_id: row.tenant_id.map(TenantId::from_uuid),
            data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
