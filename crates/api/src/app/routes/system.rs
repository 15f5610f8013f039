use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = services.engine.effective_permissions(principal.principal()).await?;
    let role = principal.principal().role();

    Ok(Json(serde_json::json!({
        "principal_id": principal.principal_id(),
        "tenant_id": principal.tenant_id(),
        "role": { "id": role.id, "name": role.name },
        "global_scope": principal.principal().is_global_scope(),
        "permissions": permissions,
    })))
}
