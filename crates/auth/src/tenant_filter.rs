//! Tenant filter: narrows every data operation to the caller's tenant.
//!
//! The filter is pure. It turns `(principal, entity, operation)` into a
//! [`ScopedOperation`] whose [`TenantPredicate`] the storage layer must apply
//! inside the same query that locates the row, so out-of-tenant rows are
//! indistinguishable from missing ones.

use serde::Serialize;
use serde_json::Value;

use platform_core::{RecordId, TenantId};

use crate::catalog;
use crate::{AccessError, Permission, Principal};

pub type JsonMap = serde_json::Map<String, Value>;

/// Payload key carrying a record's tenant.
pub const TENANT_ID_KEY: &str = "tenant_id";

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 500;

/// Permissions guarding each kind of operation on an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityPermissions {
    pub view: Permission,
    pub create: Permission,
    pub edit: Permission,
    pub delete: Permission,
}

/// A kind of data record the platform stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityType {
    pub name: &'static str,
    /// Whether rows carry a `tenant_id` attribute.
    pub tenant_scoped: bool,
    pub permissions: EntityPermissions,
}

impl EntityType {
    /// Resolve an entity by name. The set of entities is closed; unknown
    /// names never reach storage.
    pub fn lookup(name: &str) -> Option<&'static EntityType> {
        ENTITIES.iter().find(|e| e.name == name)
    }

    pub fn all() -> &'static [EntityType] {
        ENTITIES
    }

    pub fn required_permission(&self, action: RecordAction) -> &Permission {
        match action {
            RecordAction::View => &self.permissions.view,
            RecordAction::Create => &self.permissions.create,
            RecordAction::Edit => &self.permissions.edit,
            RecordAction::Delete => &self.permissions.delete,
        }
    }
}

static ENTITIES: &[EntityType] = &[
    EntityType {
        name: "projects",
        tenant_scoped: true,
        permissions: EntityPermissions {
            view: catalog::VIEW_PROJECTS,
            create: catalog::CREATE_PROJECTS,
            edit: catalog::EDIT_PROJECTS,
            delete: catalog::DELETE_PROJECTS,
        },
    },
    EntityType {
        name: "contents",
        tenant_scoped: true,
        permissions: EntityPermissions {
            view: catalog::VIEW_CONTENT,
            create: catalog::CREATE_CONTENT,
            edit: catalog::EDIT_CONTENT,
            delete: catalog::DELETE_CONTENT,
        },
    },
    EntityType {
        name: "subscriptions",
        tenant_scoped: true,
        permissions: EntityPermissions {
            view: catalog::VIEW_BILLING,
            create: catalog::MANAGE_BILLING,
            edit: catalog::MANAGE_BILLING,
            delete: catalog::MANAGE_BILLING,
        },
    },
    // Platform-wide subscription plan catalog; rows have no tenant.
    EntityType {
        name: "plans",
        tenant_scoped: false,
        permissions: EntityPermissions {
            view: catalog::VIEW_DASHBOARD,
            create: catalog::MANAGE_TENANTS,
            edit: catalog::MANAGE_TENANTS,
            delete: catalog::MANAGE_TENANTS,
        },
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    View,
    Create,
    Edit,
    Delete,
}

/// Listing parameters. Filters are equality matches on payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: JsonMap,
    pub offset: u32,
    pub limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: JsonMap::new(),
            offset: 0,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListQuery {
    pub fn new(filters: JsonMap, offset: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            filters,
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
        }
    }
}

/// A data operation before tenant scoping.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOperation {
    List(ListQuery),
    Get { id: RecordId },
    Create { payload: JsonMap },
    Update { id: RecordId, payload: JsonMap },
    Delete { id: RecordId },
}

impl RecordOperation {
    pub fn action(&self) -> RecordAction {
        match self {
            RecordOperation::List(_) | RecordOperation::Get { .. } => RecordAction::View,
            RecordOperation::Create { .. } => RecordAction::Create,
            RecordOperation::Update { .. } => RecordAction::Edit,
            RecordOperation::Delete { .. } => RecordAction::Delete,
        }
    }
}

/// Row-level tenant constraint the store must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant_id")]
pub enum TenantPredicate {
    /// No constraint (global-scope caller, or entity without tenants).
    Any,
    /// Only rows whose `tenant_id` equals this tenant.
    Tenant(TenantId),
}

impl TenantPredicate {
    /// Whether a row with the given tenant passes the predicate.
    pub fn admits(&self, row_tenant: Option<TenantId>) -> bool {
        match self {
            TenantPredicate::Any => true,
            TenantPredicate::Tenant(t) => row_tenant == Some(*t),
        }
    }

    /// Bind value for SQL: `NULL` means unconstrained.
    pub fn as_bind(&self) -> Option<TenantId> {
        match self {
            TenantPredicate::Any => None,
            TenantPredicate::Tenant(t) => Some(*t),
        }
    }
}

/// An operation narrowed to what the principal may touch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedOperation {
    pub entity: &'static EntityType,
    pub predicate: TenantPredicate,
    pub operation: RecordOperation,
}

/// Read the tenant stamped on (or supplied in) a payload.
pub fn payload_tenant(payload: &JsonMap) -> Result<Option<TenantId>, AccessError> {
    match payload.get(TENANT_ID_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse::<TenantId>()
            .map(Some)
            .map_err(|e| AccessError::validation(format!("tenant_id: {e}"))),
        Some(other) => Err(AccessError::validation(format!(
            "tenant_id must be a string, got {other}"
        ))),
    }
}

fn stamp(payload: &mut JsonMap, tenant_id: TenantId) {
    payload.insert(TENANT_ID_KEY.to_string(), Value::String(tenant_id.to_string()));
}

/// Scope `operation` on `entity` to what `principal` may see.
///
/// - global-scope principal: unconstrained; a supplied `tenant_id` is honored
///   on writes, and create defaults to the principal's own tenant
/// - tenant-scoped entity: constrained to the principal's tenant, writes are
///   stamped with it (caller values are overwritten)
/// - entity without tenants: unmodified
pub fn scope_query(
    principal: &Principal,
    entity: &'static EntityType,
    operation: RecordOperation,
) -> Result<ScopedOperation, AccessError> {
    if !principal.is_active() {
        return Err(AccessError::forbidden("principal is inactive"));
    }

    if !entity.tenant_scoped {
        return Ok(ScopedOperation {
            entity,
            predicate: TenantPredicate::Any,
            operation,
        });
    }

    if principal.is_global_scope() {
        let operation = match operation {
            RecordOperation::Create { mut payload } => {
                match (payload_tenant(&payload)?, principal.tenant_id()) {
                    (Some(_), _) => {}
                    (None, Some(own)) => stamp(&mut payload, own),
                    (None, None) => {
                        return Err(AccessError::validation(format!(
                            "tenant_id is required to create {}",
                            entity.name
                        )));
                    }
                }
                RecordOperation::Create { payload }
            }
            RecordOperation::Update { id, payload } => {
                payload_tenant(&payload)?;
                RecordOperation::Update { id, payload }
            }
            other => other,
        };
        return Ok(ScopedOperation {
            entity,
            predicate: TenantPredicate::Any,
            operation,
        });
    }

    // Principal construction guarantees a tenant for non-global principals;
    // fail closed if that ever stops holding.
    let own = principal.tenant_id().ok_or(AccessError::NotFound)?;

    let operation = match operation {
        RecordOperation::Create { mut payload } => {
            stamp(&mut payload, own);
            RecordOperation::Create { payload }
        }
        RecordOperation::Update { id, mut payload } => {
            stamp(&mut payload, own);
            RecordOperation::Update { id, payload }
        }
        other => other,
    };

    Ok(ScopedOperation {
        entity,
        predicate: TenantPredicate::Tenant(own),
        operation,
    })
}

#[cfg(test)]
mod tests {
    use platform_core::{PrincipalId, RoleId};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::RoleRef;
    use crate::roles::{SUPER_ADMIN, TENANT_ADMIN};

    fn tenant_admin(tenant: TenantId) -> Principal {
        let role = RoleRef {
            id: RoleId::new(),
            name: TENANT_ADMIN,
        };
        Principal::new(PrincipalId::new(), Some(tenant), role, false, true).unwrap()
    }

    fn super_admin(tenant: Option<TenantId>) -> Principal {
        let role = RoleRef {
            id: RoleId::new(),
            name: SUPER_ADMIN,
        };
        Principal::new(PrincipalId::new(), tenant, role, true, true).unwrap()
    }

    fn projects() -> &'static EntityType {
        EntityType::lookup("projects").unwrap()
    }

    fn payload(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn created_payload(op: &ScopedOperation) -> &JsonMap {
        match &op.operation {
            RecordOperation::Create { payload } => payload,
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn unknown_entities_do_not_resolve() {
        assert!(EntityType::lookup("users; DROP TABLE roles").is_none());
        assert!(EntityType::lookup("plans").is_some());
    }

    #[test]
    fn non_global_create_overrides_caller_tenant() {
        let own = TenantId::new();
        let foreign = TenantId::new();
        let p = tenant_admin(own);

        let op = RecordOperation::Create {
            payload: payload(json!({ "name": "X", "tenant_id": foreign.to_string() })),
        };
        let scoped = scope_query(&p, projects(), op).unwrap();

        assert_eq!(scoped.predicate, TenantPredicate::Tenant(own));
        assert_eq!(payload_tenant(created_payload(&scoped)).unwrap(), Some(own));
        assert_eq!(created_payload(&scoped)["name"], json!("X"));
    }

    #[test]
    fn global_create_honors_supplied_tenant() {
        let foreign = TenantId::new();
        let p = super_admin(Some(TenantId::new()));

        let op = RecordOperation::Create {
            payload: payload(json!({ "tenant_id": foreign.to_string() })),
        };
        let scoped = scope_query(&p, projects(), op).unwrap();

        assert_eq!(scoped.predicate, TenantPredicate::Any);
        assert_eq!(payload_tenant(created_payload(&scoped)).unwrap(), Some(foreign));
    }

    #[test]
    fn global_create_defaults_to_own_tenant() {
        let own = TenantId::new();
        let p = super_admin(Some(own));

        let scoped = scope_query(&p, projects(), RecordOperation::Create { payload: JsonMap::new() }).unwrap();
        assert_eq!(payload_tenant(created_payload(&scoped)).unwrap(), Some(own));

        let tenantless = super_admin(None);
        let err = scope_query(&tenantless, projects(), RecordOperation::Create { payload: JsonMap::new() })
            .unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }

    #[test]
    fn global_update_without_tenant_leaves_it_alone() {
        let p = super_admin(Some(TenantId::new()));
        let op = RecordOperation::Update {
            id: RecordId::new(),
            payload: payload(json!({ "name": "renamed" })),
        };
        let scoped = scope_query(&p, projects(), op).unwrap();
        let RecordOperation::Update { payload, .. } = &scoped.operation else {
            panic!("expected update");
        };
        assert!(!payload.contains_key(TENANT_ID_KEY));
    }

    #[test]
    fn malformed_tenant_is_a_validation_error() {
        let p = super_admin(Some(TenantId::new()));
        let op = RecordOperation::Create {
            payload: payload(json!({ "tenant_id": 99 })),
        };
        assert!(matches!(
            scope_query(&p, projects(), op),
            Err(AccessError::Validation(_))
        ));
    }

    #[test]
    fn entity_without_tenants_is_untouched() {
        let p = tenant_admin(TenantId::new());
        let plans = EntityType::lookup("plans").unwrap();
        let original = RecordOperation::Create {
            payload: payload(json!({ "name": "Starter" })),
        };
        let scoped = scope_query(&p, plans, original.clone()).unwrap();
        assert_eq!(scoped.predicate, TenantPredicate::Any);
        assert_eq!(scoped.operation, original);
    }

    #[test]
    fn inactive_principal_cannot_be_scoped() {
        let role = RoleRef {
            id: RoleId::new(),
            name: TENANT_ADMIN,
        };
        let p = Principal::new(PrincipalId::new(), Some(TenantId::new()), role, false, false).unwrap();
        assert!(scope_query(&p, projects(), RecordOperation::Get { id: RecordId::new() }).is_err());
    }

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(ListQuery::new(JsonMap::new(), None, Some(10_000)).limit, MAX_LIST_LIMIT);
        assert_eq!(ListQuery::new(JsonMap::new(), None, Some(0)).limit, 1);
        assert_eq!(ListQuery::new(JsonMap::new(), None, None).limit, DEFAULT_LIST_LIMIT);
    }

    proptest! {
        #[test]
        fn non_global_reads_never_admit_foreign_rows(seed_a in any::<u128>(), seed_b in any::<u128>()) {
            prop_assume!(seed_a != seed_b);
            let own = TenantId::from_uuid(uuid::Uuid::from_u128(seed_a));
            let foreign = TenantId::from_uuid(uuid::Uuid::from_u128(seed_b));
            let p = tenant_admin(own);

            let scoped = scope_query(&p, projects(), RecordOperation::Get { id: RecordId::new() }).unwrap();
            prop_assert!(scoped.predicate.admits(Some(own)));
            prop_assert!(!scoped.predicate.admits(Some(foreign)));
            prop_assert!(!scoped.predicate.admits(None));
        }
    }
}
