use serde::Serialize;

use platform_core::{PrincipalId, TenantId};

use crate::{Permission, PermissionSet, Principal, RoleRef};

/// The current state of a principal's role, as read from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: RoleRef,
    pub global_scope: bool,
    pub permissions: PermissionSet,
}

/// Everything a single permission check needs.
///
/// Policy sources fetch this in one round trip: whether the requested
/// permission exists at all, and the principal's role grant (absent when the
/// role is unknown or was deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub permission_defined: bool,
    pub role: Option<RoleGrant>,
}

impl AccessGrant {
    /// Grant view that denies everything; used when the policy source fails.
    pub fn nothing() -> Self {
        Self {
            permission_defined: false,
            role: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    GlobalScope,
    Wildcard,
    ExplicitGrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    Inactive,
    UndefinedPermission,
    UnknownRole,
    MissingPermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenialKind),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Decide whether `principal` holds `required`.
///
/// - No IO
/// - No panics
/// - Deny unless an explicit rule allows
pub fn decide(principal: Option<&Principal>, required: &Permission, grant: &AccessGrant) -> Decision {
    let Some(principal) = principal else {
        return Decision::Deny(DenialKind::Unauthenticated);
    };
    if !principal.is_active() {
        return Decision::Deny(DenialKind::Inactive);
    }
    // Closed world: nobody, not even the global-scope role, holds an
    // identifier that is not defined.
    if !grant.permission_defined {
        return Decision::Deny(DenialKind::UndefinedPermission);
    }
    let Some(role) = grant.role.as_ref().filter(|r| r.role.id == principal.role().id) else {
        return Decision::Deny(DenialKind::UnknownRole);
    };
    if role.global_scope {
        return Decision::Allow(AllowReason::GlobalScope);
    }
    match &role.permissions {
        PermissionSet::All => Decision::Allow(AllowReason::Wildcard),
        PermissionSet::Explicit(set) if set.contains(required) => {
            Decision::Allow(AllowReason::ExplicitGrant)
        }
        PermissionSet::Explicit(_) => Decision::Deny(DenialKind::MissingPermission),
    }
}

pub fn authorize(principal: Option<&Principal>, required: &Permission, grant: &AccessGrant) -> bool {
    decide(principal, required, grant).is_allowed()
}

/// Cross-tenant mutation guard: allowed for an active global-scope principal,
/// or an active principal acting on its own tenant.
pub fn authorize_self_or_same_tenant(principal: Option<&Principal>, target_tenant_id: TenantId) -> bool {
    match principal {
        Some(p) if p.is_active() => p.is_global_scope() || p.tenant_id() == Some(target_tenant_id),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub decision: Decision,
    pub reason: String,
    pub principal: Option<PrincipalState>,
    pub denial_reason: Option<DenialReason>,
}

/// Current state of the principal being checked.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub tenant_id: Option<TenantId>,
    pub role: String,
    pub global_scope: bool,
    pub is_active: bool,
    pub effective_permissions: Vec<String>,
    pub has_wildcard: bool,
}

/// Detailed reason why authorization was denied.
#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    principal: Option<&Principal>,
    required: &Permission,
    grant: &AccessGrant,
) -> AuthorizationExplanation {
    let required_str = required.as_str();
    let decision = decide(principal, required, grant);

    let state = principal.map(|p| {
        let permissions = grant
            .role
            .as_ref()
            .map(|r| {
                if r.global_scope {
                    PermissionSet::All
                } else {
                    r.permissions.clone()
                }
            })
            .unwrap_or_default();
        PrincipalState {
            principal_id: p.id(),
            tenant_id: p.tenant_id(),
            role: p.role().name.as_str().to_string(),
            global_scope: p.is_global_scope(),
            is_active: p.is_active(),
            has_wildcard: permissions.is_wildcard(),
            effective_permissions: permissions.to_strings(),
        }
    });

    let (reason, denial_reason) = match decision {
        Decision::Allow(AllowReason::GlobalScope) => (
            "Principal holds the global-scope role".to_string(),
            None,
        ),
        Decision::Allow(AllowReason::Wildcard) => (
            "Principal's role grants the wildcard permission set".to_string(),
            None,
        ),
        Decision::Allow(AllowReason::ExplicitGrant) => (
            format!("Principal's role explicitly grants '{required_str}'"),
            None,
        ),
        Decision::Deny(kind) => {
            let (message, suggestions) = denial_details(kind, required_str);
            (message.clone(), Some(DenialReason { kind, message, suggestions }))
        }
    };

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted: decision.is_allowed(),
        decision,
        reason,
        principal: state,
        denial_reason,
    }
}

fn denial_details(kind: DenialKind, required: &str) -> (String, Vec<String>) {
    match kind {
        DenialKind::Unauthenticated => (
            "No authenticated principal".to_string(),
            vec!["Send a valid bearer token".to_string()],
        ),
        DenialKind::Inactive => (
            "Principal is deactivated and holds no permissions".to_string(),
            vec!["Ask an administrator to reactivate the account".to_string()],
        ),
        DenialKind::UndefinedPermission => (
            format!("Permission '{required}' is not defined"),
            vec![
                "Check the permission identifier for typos".to_string(),
                format!("Create the '{required}' permission before granting it"),
            ],
        ),
        DenialKind::UnknownRole => (
            "Principal's role does not exist in the role registry".to_string(),
            vec!["Assign the principal an existing role".to_string()],
        ),
        DenialKind::MissingPermission => (
            format!("Missing required permission: '{required}'"),
            vec![
                format!("Assign a role that grants the '{required}' permission"),
                format!("Add '{required}' to the principal's role"),
            ],
        ),
    }
}
