use std::borrow::Cow;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use platform_core::{DomainError, DomainResult, Entity, RoleId};

use crate::Permission;
use crate::permissions::require_text;

/// Name of the role designated global-scope by the built-in catalog.
pub const SUPER_ADMIN: RoleName = RoleName::from_static("SUPER_ADMIN");
pub const TENANT_ADMIN: RoleName = RoleName::from_static("TENANT_ADMIN");
pub const USER: RoleName = RoleName::from_static("USER");
pub const VIEWER: RoleName = RoleName::from_static("VIEWER");

/// Role name used for RBAC.
///
/// Names are unique and immutable once a role exists; principals reference
/// roles by id, the name is the stable human identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(Cow<'static, str>);

impl RoleName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn parse(name: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let role = Self::new(name);
        role.validate()?;
        Ok(role)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names are 1..=50 chars of `[A-Za-z0-9_]`.
    pub fn validate(&self) -> DomainResult<()> {
        let s = self.as_str();
        if s.is_empty() || s.len() > 50 {
            return Err(DomainError::validation("role name must be 1..=50 characters"));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DomainError::validation(format!(
                "role name '{s}' may only contain letters, digits and '_'"
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The permissions a role grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "permissions")]
pub enum PermissionSet {
    /// Wildcard: every permission, including ones defined later.
    All,
    Explicit(BTreeSet<Permission>),
}

impl Default for PermissionSet {
    fn default() -> Self {
        PermissionSet::Explicit(BTreeSet::new())
    }
}

impl PermissionSet {
    pub fn explicit<I>(permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        PermissionSet::Explicit(permissions.into_iter().collect())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PermissionSet::All)
    }

    /// Membership test. The wildcard contains everything; callers are
    /// responsible for the closed-world check against defined permissions.
    pub fn contains(&self, permission: &Permission) -> bool {
        match self {
            PermissionSet::All => true,
            PermissionSet::Explicit(set) => set.contains(permission),
        }
    }

    pub fn explicit_permissions(&self) -> Option<&BTreeSet<Permission>> {
        match self {
            PermissionSet::All => None,
            PermissionSet::Explicit(set) => Some(set),
        }
    }

    /// Human-readable listing (`["*"]` for the wildcard).
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            PermissionSet::All => vec!["*".to_string()],
            PermissionSet::Explicit(set) => set.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

/// Lightweight reference to a role carried by principals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: RoleName,
}

/// A persisted role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub display_name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    /// At most one role in the registry carries this flag.
    pub global_scope: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn to_ref(&self) -> RoleRef {
        RoleRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Permission set as seen by authorization: the global-scope role always
    /// holds the wildcard.
    pub fn effective_permissions(&self) -> PermissionSet {
        if self.global_scope {
            PermissionSet::All
        } else {
            self.permissions.clone()
        }
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: RoleName,
    pub display_name: String,
    pub description: Option<String>,
}

impl NewRole {
    pub fn validate(&self) -> DomainResult<()> {
        self.name.validate()?;
        require_text("display_name", &self.display_name, 100)
    }

    /// New roles start with an empty explicit permission set.
    pub fn into_role(self, id: RoleId, now: DateTime<Utc>) -> Role {
        Role {
            id,
            name: self.name,
            display_name: self.display_name.trim().to_string(),
            description: self.description,
            permissions: PermissionSet::default(),
            global_scope: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mutable fields of a role. Name and id are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl RoleUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(display_name) = &self.display_name {
            require_text("display_name", display_name, 100)?;
        }
        Ok(())
    }

    pub fn apply(&self, role: &mut Role, now: DateTime<Utc>) {
        if let Some(display_name) = &self.display_name {
            role.display_name = display_name.trim().to_string();
        }
        if let Some(description) = &self.description {
            role.description = Some(description.clone());
        }
        role.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_reject_spaces_and_empty() {
        assert!(RoleName::parse("TENANT_ADMIN").is_ok());
        assert!(RoleName::parse("tenant admin").is_err());
        assert!(RoleName::parse("").is_err());
    }

    #[test]
    fn wildcard_contains_anything() {
        assert!(PermissionSet::All.contains(&Permission::from_static("not_yet_defined")));
        let set = PermissionSet::explicit([Permission::from_static("view_users")]);
        assert!(set.contains(&Permission::from_static("view_users")));
        assert!(!set.contains(&Permission::from_static("edit_users")));
    }

    #[test]
    fn global_scope_role_is_effectively_wildcard() {
        let mut role = NewRole {
            name: SUPER_ADMIN,
            display_name: "Super admin".into(),
            description: None,
        }
        .into_role(RoleId::new(), Utc::now());
        assert_eq!(role.effective_permissions(), PermissionSet::default());

        role.global_scope = true;
        assert!(role.effective_permissions().is_wildcard());
    }

    #[test]
    fn permission_set_json_shape() {
        let json = serde_json::to_value(PermissionSet::All).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "all" }));

        let json = serde_json::to_value(PermissionSet::explicit([Permission::from_static(
            "view_users",
        )]))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "explicit", "permissions": ["view_users"] })
        );
    }
}
