//! Permission guard for handlers that call the admin services directly.

use platform_auth::{AccessError, Permission};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Require `permission` for the current request's principal.
pub async fn require(services: &AppServices, ctx: &PrincipalContext, permission: &Permission) -> Result<(), ApiError> {
    services.engine.require(ctx.principal(), permission).await.map_err(|err| {
        if let AccessError::Forbidden(reason) = &err {
            tracing::warn!(principal_id = %ctx.principal_id(), %permission, %reason, "request denied");
        }
        ApiError(err)
    })
}
