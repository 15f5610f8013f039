use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use platform_core::{DomainError, DomainResult, Entity, PermissionId};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "view_users"). The set of
/// valid identifiers is closed: only identifiers present in the permission
/// table can ever be granted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build a permission identifier from untrusted input.
    pub fn parse(name: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let permission = Self::new(name);
        permission.validate()?;
        Ok(permission)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifiers are 1..=100 chars of `[a-z0-9_.:]`.
    pub fn validate(&self) -> DomainResult<()> {
        let s = self.as_str();
        if s.is_empty() || s.len() > 100 {
            return Err(DomainError::validation(
                "permission identifier must be 1..=100 characters",
            ));
        }
        let valid = s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | ':'));
        if !valid {
            return Err(DomainError::validation(format!(
                "permission identifier '{s}' may only contain a-z, 0-9, '_', '.', ':'"
            )));
        }
        Ok(())
    }

    /// Split a `verb_resource` identifier into `(resource, action)`.
    ///
    /// `view_users` → `("users", "view")`; identifiers without an underscore
    /// map to `(identifier, "access")`.
    pub fn resource_and_action(&self) -> (String, String) {
        match self.as_str().split_once('_') {
            Some((action, resource)) => (resource.to_string(), action.to_string()),
            None => (self.as_str().to_string(), "access".to_string()),
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted permission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub id: PermissionId,
    pub name: Permission,
    pub display_name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for PermissionDefinition {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: Permission,
    pub display_name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

impl NewPermission {
    pub fn validate(&self) -> DomainResult<()> {
        self.name.validate()?;
        require_text("display_name", &self.display_name, 100)?;
        require_text("resource", &self.resource, 50)?;
        require_text("action", &self.action, 50)?;
        Ok(())
    }

    pub fn into_definition(self, id: PermissionId, created_at: DateTime<Utc>) -> PermissionDefinition {
        PermissionDefinition {
            id,
            name: self.name,
            display_name: self.display_name.trim().to_string(),
            resource: self.resource.trim().to_string(),
            action: self.action.trim().to_string(),
            description: self.description,
            created_at,
        }
    }
}

/// Mutable fields of a permission. Identifier, resource and action are fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl PermissionUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(display_name) = &self.display_name {
            require_text("display_name", display_name, 100)?;
        }
        Ok(())
    }

    pub fn apply(&self, permission: &mut PermissionDefinition) {
        if let Some(display_name) = &self.display_name {
            permission.display_name = display_name.trim().to_string();
        }
        if let Some(description) = &self.description {
            permission.description = Some(description.clone());
        }
    }
}

pub(crate) fn require_text(field: &str, value: &str, max: usize) -> DomainResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_charset_is_enforced() {
        assert!(Permission::parse("view_users").is_ok());
        assert!(Permission::parse("billing.invoices:read").is_ok());
        assert!(Permission::parse("View Users").is_err());
        assert!(Permission::parse("").is_err());
        assert!(Permission::parse("x".repeat(101)).is_err());
    }

    #[test]
    fn resource_and_action_follow_verb_resource_shape() {
        let p = Permission::from_static("manage_payment_methods");
        assert_eq!(
            p.resource_and_action(),
            ("payment_methods".to_string(), "manage".to_string())
        );
        let bare = Permission::from_static("audit");
        assert_eq!(bare.resource_and_action(), ("audit".to_string(), "access".to_string()));
    }

    #[test]
    fn update_only_touches_provided_fields() {
        let mut def = NewPermission {
            name: Permission::from_static("view_users"),
            display_name: "View users".into(),
            resource: "users".into(),
            action: "view".into(),
            description: None,
        }
        .into_definition(PermissionId::new(), Utc::now());

        PermissionUpdate {
            display_name: None,
            description: Some("List users in the tenant".into()),
        }
        .apply(&mut def);

        assert_eq!(def.display_name, "View users");
        assert_eq!(def.description.as_deref(), Some("List users in the tenant"));
    }
}
