//! Built-in permission catalog and role registry seed.
//!
//! This is the static, closed list of operations the platform ships with. It
//! only seeds the persisted permission/role tables; authorization decisions
//! always read the persisted data.

use crate::roles::{SUPER_ADMIN, TENANT_ADMIN, USER, VIEWER};
use crate::{NewPermission, NewRole, Permission, PermissionSet, RoleName};

pub const VIEW_DASHBOARD: Permission = Permission::from_static("view_dashboard");

pub const VIEW_USERS: Permission = Permission::from_static("view_users");
pub const CREATE_USERS: Permission = Permission::from_static("create_users");
pub const EDIT_USERS: Permission = Permission::from_static("edit_users");
pub const DELETE_USERS: Permission = Permission::from_static("delete_users");
pub const RESET_PASSWORDS: Permission = Permission::from_static("reset_passwords");

pub const VIEW_PROJECTS: Permission = Permission::from_static("view_projects");
pub const CREATE_PROJECTS: Permission = Permission::from_static("create_projects");
pub const EDIT_PROJECTS: Permission = Permission::from_static("edit_projects");
pub const DELETE_PROJECTS: Permission = Permission::from_static("delete_projects");
pub const PUBLISH_PROJECTS: Permission = Permission::from_static("publish_projects");

pub const VIEW_CONTENT: Permission = Permission::from_static("view_content");
pub const CREATE_CONTENT: Permission = Permission::from_static("create_content");
pub const EDIT_CONTENT: Permission = Permission::from_static("edit_content");
pub const DELETE_CONTENT: Permission = Permission::from_static("delete_content");

pub const VIEW_BILLING: Permission = Permission::from_static("view_billing");
pub const MANAGE_BILLING: Permission = Permission::from_static("manage_billing");
pub const VIEW_INVOICES: Permission = Permission::from_static("view_invoices");
pub const MANAGE_PAYMENT_METHODS: Permission = Permission::from_static("manage_payment_methods");

pub const VIEW_SETTINGS: Permission = Permission::from_static("view_settings");
pub const MANAGE_SETTINGS: Permission = Permission::from_static("manage_settings");
pub const MANAGE_API_KEYS: Permission = Permission::from_static("manage_api_keys");

pub const VIEW_ALL_TENANTS: Permission = Permission::from_static("view_all_tenants");
pub const MANAGE_TENANTS: Permission = Permission::from_static("manage_tenants");
pub const VIEW_SYSTEM_LOGS: Permission = Permission::from_static("view_system_logs");
pub const MANAGE_ROLES: Permission = Permission::from_static("manage_roles");

/// One catalog line: identifier, human label, roles granted it by default.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub permission: Permission,
    pub label: &'static str,
    pub roles: &'static [RoleName],
}

impl CatalogEntry {
    pub fn to_new_permission(&self) -> NewPermission {
        let (resource, action) = self.permission.resource_and_action();
        NewPermission {
            name: self.permission.clone(),
            display_name: self.label.to_string(),
            resource,
            action,
            description: None,
        }
    }
}

const ADMIN_USER_VIEWER: &[RoleName] = &[TENANT_ADMIN, USER, VIEWER];
const ADMIN_USER: &[RoleName] = &[TENANT_ADMIN, USER];
const ADMIN: &[RoleName] = &[TENANT_ADMIN];
const NOBODY: &[RoleName] = &[];

macro_rules! entry {
    ($perm:expr, $label:literal, $roles:expr) => {
        CatalogEntry {
            permission: $perm,
            label: $label,
            roles: $roles,
        }
    };
}

/// Every permission the platform defines out of the box.
pub fn builtin_permissions() -> Vec<CatalogEntry> {
    vec![
        entry!(VIEW_DASHBOARD, "View dashboard", ADMIN_USER_VIEWER),
        entry!(VIEW_USERS, "View users", ADMIN),
        entry!(CREATE_USERS, "Create users", ADMIN),
        entry!(EDIT_USERS, "Edit users", ADMIN),
        entry!(DELETE_USERS, "Delete users", ADMIN),
        entry!(RESET_PASSWORDS, "Reset passwords", ADMIN),
        entry!(VIEW_PROJECTS, "View projects", ADMIN_USER_VIEWER),
        entry!(CREATE_PROJECTS, "Create projects", ADMIN),
        entry!(EDIT_PROJECTS, "Edit projects", ADMIN),
        entry!(DELETE_PROJECTS, "Delete projects", ADMIN),
        entry!(PUBLISH_PROJECTS, "Publish projects", ADMIN),
        entry!(VIEW_CONTENT, "View content", ADMIN_USER_VIEWER),
        entry!(CREATE_CONTENT, "Create content", ADMIN_USER),
        entry!(EDIT_CONTENT, "Edit content", ADMIN_USER),
        entry!(DELETE_CONTENT, "Delete content", ADMIN),
        entry!(VIEW_BILLING, "View billing", ADMIN),
        entry!(MANAGE_BILLING, "Manage billing", ADMIN),
        entry!(VIEW_INVOICES, "View invoices", ADMIN),
        entry!(MANAGE_PAYMENT_METHODS, "Manage payment methods", ADMIN),
        entry!(VIEW_SETTINGS, "View settings", ADMIN_USER),
        entry!(MANAGE_SETTINGS, "Manage settings", ADMIN),
        entry!(MANAGE_API_KEYS, "Manage API keys", NOBODY),
        entry!(VIEW_ALL_TENANTS, "View all tenants", NOBODY),
        entry!(MANAGE_TENANTS, "Manage tenants", NOBODY),
        entry!(VIEW_SYSTEM_LOGS, "View system logs", NOBODY),
        entry!(MANAGE_ROLES, "Manage roles and permissions", NOBODY),
    ]
}

/// A role the platform ships with.
#[derive(Debug, Clone)]
pub struct BuiltinRole {
    pub role: NewRole,
    pub permissions: PermissionSet,
    pub global_scope: bool,
}

/// Built-in roles with their default grants derived from the catalog.
pub fn builtin_roles() -> Vec<BuiltinRole> {
    let catalog = builtin_permissions();
    let granted_to = |role: &RoleName| {
        PermissionSet::explicit(
            catalog
                .iter()
                .filter(|entry| entry.roles.contains(role))
                .map(|entry| entry.permission.clone()),
        )
    };

    vec![
        BuiltinRole {
            role: new_role(SUPER_ADMIN, "Super admin", "Platform operator with access to every tenant"),
            permissions: PermissionSet::All,
            global_scope: true,
        },
        BuiltinRole {
            role: new_role(TENANT_ADMIN, "Tenant admin", "Administers users and data of one tenant"),
            permissions: granted_to(&TENANT_ADMIN),
            global_scope: false,
        },
        BuiltinRole {
            role: new_role(USER, "User", "Regular member of a tenant"),
            permissions: granted_to(&USER),
            global_scope: false,
        },
        BuiltinRole {
            role: new_role(VIEWER, "Viewer", "Read-only member of a tenant"),
            permissions: granted_to(&VIEWER),
            global_scope: false,
        },
    ]
}

fn new_role(name: RoleName, display_name: &str, description: &str) -> NewRole {
    NewRole {
        name,
        display_name: display_name.to_string(),
        description: Some(description.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_identifiers_are_unique_and_valid() {
        let entries = builtin_permissions();
        let names: HashSet<_> = entries.iter().map(|e| e.permission.clone()).collect();
        assert_eq!(names.len(), entries.len());
        for entry in &entries {
            entry.permission.validate().unwrap();
            entry.to_new_permission().validate().unwrap();
        }
    }

    #[test]
    fn exactly_one_builtin_role_is_global_scope() {
        let roles = builtin_roles();
        let global: Vec<_> = roles.iter().filter(|r| r.global_scope).collect();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].role.name, SUPER_ADMIN);
        assert!(global[0].permissions.is_wildcard());
    }

    #[test]
    fn viewer_is_read_only() {
        let roles = builtin_roles();
        let viewer = roles.iter().find(|r| r.role.name == VIEWER).unwrap();
        let perms = viewer.permissions.explicit_permissions().unwrap();
        assert!(perms.iter().all(|p| p.as_str().starts_with("view_")));
        assert!(perms.contains(&VIEW_PROJECTS));
    }
}
