//! `platform-auth`: pure authorization core (deny by default, tenant isolation).
//!
//! This crate is intentionally decoupled from HTTP and storage. Stores feed it
//! [`AccessGrant`]s and it answers with [`Decision`]s and [`ScopedOperation`]s.

pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod error;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod tenant_filter;

pub use authorize::{
    AccessGrant, AllowReason, AuthorizationExplanation, Decision, DenialKind, DenialReason, PrincipalState,
    RoleGrant, authorize, authorize_self_or_same_tenant, decide, explain_authorization,
};
pub use catalog::{BuiltinRole, CatalogEntry, builtin_permissions, builtin_roles};
pub use claims::{CredentialClaims, CredentialError, CredentialVerifier, TokenValidationError, validate_claims};
pub use error::{AccessError, AuthenticationError};
pub use permissions::{NewPermission, Permission, PermissionDefinition, PermissionUpdate};
pub use principal::Principal;
pub use roles::{NewRole, PermissionSet, Role, RoleName, RoleRef, RoleUpdate};
pub use tenant_filter::{
    EntityPermissions, EntityType, JsonMap, ListQuery, RecordAction, RecordOperation, ScopedOperation,
    TenantPredicate, payload_tenant, scope_query,
};
