//! Request bodies and JSON renderings that differ from the domain types.

use serde::Deserialize;
use serde_json::{Value, json};

use platform_auth::{AccessError, NewPermission, Permission, PermissionDefinition, PermissionSet, Role};
use platform_infra::StoredRecord;

/// Body of `PUT /rbac/roles/:id/permissions`. `["*"]` grants the wildcard.
#[derive(Debug, Deserialize)]
pub struct AssignPermissionsRequest {
    pub permissions: Vec<String>,
}

impl AssignPermissionsRequest {
    pub fn into_permission_set(self) -> Result<PermissionSet, AccessError> {
        if self.permissions.iter().any(|p| p == "*") {
            if self.permissions.len() > 1 {
                return Err(AccessError::validation("'*' cannot be combined with other permissions"));
            }
            return Ok(PermissionSet::All);
        }
        let parsed = self
            .permissions
            .into_iter()
            .map(Permission::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PermissionSet::explicit(parsed))
    }
}

/// Body of `POST /rbac/permissions`. Resource and action default to the
/// split of the identifier.
#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
}

impl CreatePermissionRequest {
    pub fn into_new_permission(self) -> Result<NewPermission, AccessError> {
        let name = Permission::parse(self.name)?;
        let (resource, action) = name.resource_and_action();
        Ok(NewPermission {
            display_name: self.display_name.unwrap_or_else(|| name.to_string()),
            resource: self.resource.unwrap_or(resource),
            action: self.action.unwrap_or(action),
            description: self.description,
            name,
        })
    }
}

pub fn role_json(role: &Role) -> Value {
    json!({
        "id": role.id,
        "name": role.name,
        "display_name": role.display_name,
        "description": role.description,
        "global_scope": role.global_scope,
        "permissions": role.effective_permissions().to_strings(),
        "created_at": role.created_at,
        "updated_at": role.updated_at,
    })
}

pub fn permission_json(permission: &PermissionDefinition) -> Value {
    json!({
        "id": permission.id,
        "name": permission.name,
        "display_name": permission.display_name,
        "resource": permission.resource,
        "action": permission.action,
        "description": permission.description,
        "created_at": permission.created_at,
    })
}

pub fn records_json(records: &[StoredRecord]) -> Value {
    Value::Array(records.iter().map(StoredRecord::to_json).collect())
}
