use std::str::FromStr;

use axum::{Router, routing::get};

use platform_auth::AccessError;
use platform_core::DomainError;

use crate::app::errors::ApiError;

pub mod rbac;
pub mod records;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/rbac", rbac::router())
        .nest("/crud", records::router())
        .nest("/users", users::router())
}

/// Parse a path identifier; malformed ids are a validation error.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(|e| ApiError(AccessError::from(e)))
}
