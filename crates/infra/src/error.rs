//! Store error type and SQLx error mapping.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate role/permission name, second global-scope role |
//! | Database (foreign key violation) | `23503` | `Conflict` | Row still referenced, or reference to a missing row |
//! | Database (check constraint violation) | `23514` | `Validation` | Column constraint rejected the value |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Unavailable` | Connection failures, timeouts |

use thiserror::Error;

use platform_auth::AccessError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("role '{role}' is still assigned to {principals} principal(s)")]
    RoleInUse { role: String, principals: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Poisoned in-memory lock. The store is unusable from then on.
    pub(crate) fn poisoned() -> Self {
        Self::Unavailable("store lock poisoned".to_string())
    }
}

impl From<StoreError> for AccessError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => AccessError::NotFound,
            StoreError::Conflict(msg) => AccessError::Conflict(msg),
            StoreError::Validation(msg) => AccessError::Validation(msg),
            StoreError::RoleInUse { role, principals } => AccessError::RoleInUse { role, principals },
            StoreError::Unavailable(msg) => AccessError::Unavailable(msg),
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "23505" => StoreError::Conflict(msg),
                    "23503" => StoreError::Conflict(msg),
                    "23514" => StoreError::Validation(msg),
                    _ => StoreError::Unavailable(msg),
                }
            } else {
                StoreError::Unavailable(msg)
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Unavailable(format!("{} failed: {}", operation, other)),
    }
}

/// Whether `err` is a database error with the given SQLSTATE code.
pub(crate) fn is_violation(err: &sqlx::Error, sqlstate: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == sqlstate;
        }
    }
    false
}

pub(crate) const FOREIGN_KEY_VIOLATION: &str = "23503";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_in_use_keeps_its_details_across_layers() {
        let err: AccessError = StoreError::RoleInUse {
            role: "USER".to_string(),
            principals: 3,
        }
        .into();
        assert_eq!(
            err,
            AccessError::RoleInUse {
                role: "USER".to_string(),
                principals: 3
            }
        );
    }

    #[test]
    fn connection_failures_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("list_roles", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert_eq!(map_sqlx_error("get_role", sqlx::Error::RowNotFound), StoreError::NotFound);
    }
}
