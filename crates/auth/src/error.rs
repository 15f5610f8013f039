//! Authentication/authorization error taxonomy.
//!
//! Every failure surfaced by the authorization core carries one of these tags;
//! the HTTP edge maps them onto status codes.

use thiserror::Error;

use platform_core::DomainError;

/// Failure to establish *who* is calling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The credential was rejected by the verifier or carries no usable subject.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The credential's subject does not resolve to a known principal.
    #[error("principal not found")]
    PrincipalNotFound,

    /// The principal exists but is deactivated.
    #[error("principal is inactive")]
    PrincipalInactive,
}

/// Error taxonomy of the authorization core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// Authenticated, but the action is not permitted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target does not exist *for this caller*. Also used to mask
    /// cross-tenant access so existence is never revealed.
    #[error("not found")]
    NotFound,

    /// A role cannot be deleted while principals still reference it.
    #[error("role '{role}' is still assigned to {principals} principal(s)")]
    RoleInUse { role: String, principals: u64 },

    /// Uniqueness or state conflict (duplicate name, protected role, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed role/permission/record payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store failed or timed out. Always treated as a denial.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl AccessError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::Authentication(AuthenticationError::InvalidCredential(msg.into()))
    }
}

impl From<DomainError> for AccessError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => AccessError::Validation(msg),
            DomainError::InvalidId(msg) => AccessError::Validation(msg),
            DomainError::NotFound => AccessError::NotFound,
            DomainError::Conflict(msg) => AccessError::Conflict(msg),
        }
    }
}
