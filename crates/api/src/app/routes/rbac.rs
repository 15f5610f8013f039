//! Role and permission administration, plus authorization explanations.
//!
//! Reads require `view_users`; mutations require `manage_roles`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;

use platform_auth::catalog::{MANAGE_ROLES, VIEW_USERS};
use platform_auth::{NewRole, Permission, PermissionUpdate, RoleUpdate};
use platform_core::{PermissionId, RoleId};

use crate::app::dto::{self, AssignPermissionsRequest, CreatePermissionRequest};
use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/:id/permissions", get(role_permissions).put(assign_permissions))
        .route("/roles/:id/permissions/:permission_id", delete(revoke_permission))
        .route("/roles/:id/global-scope", post(designate_global_scope))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
        .route("/explain", get(explain))
}

// Roles

/// GET /rbac/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let roles = services.admin.list_roles().await?;
    Ok(Json(json!({ "roles": roles.iter().map(dto::role_json).collect::<Vec<_>>() })))
}

/// POST /rbac/roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(input): Json<NewRole>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let role = services.admin.create_role(input).await?;
    Ok((StatusCode::CREATED, Json(dto::role_json(&role))))
}

/// GET /rbac/roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let id: RoleId = parse_id(&id)?;
    let role = services.admin.get_role(id).await?;
    Ok(Json(dto::role_json(&role)))
}

/// PUT /rbac/roles/:id - display name and description
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: RoleId = parse_id(&id)?;
    let role = services.admin.update_role(id, update).await?;
    Ok(Json(dto::role_json(&role)))
}

/// DELETE /rbac/roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: RoleId = parse_id(&id)?;
    services.admin.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rbac/roles/:id/global-scope
pub async fn designate_global_scope(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: RoleId = parse_id(&id)?;
    let role = services.admin.designate_global_scope(id).await?;
    Ok(Json(dto::role_json(&role)))
}

/// GET /rbac/roles/:id/permissions
pub async fn role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let id: RoleId = parse_id(&id)?;
    let set = services.admin.role_permissions(id).await?;
    Ok(Json(json!({ "role_id": id, "permissions": set.to_strings() })))
}

/// PUT /rbac/roles/:id/permissions - replace the whole set
pub async fn assign_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignPermissionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: RoleId = parse_id(&id)?;
    let set = services.admin.assign_permissions(id, body.into_permission_set()?).await?;
    Ok(Json(json!({ "role_id": id, "permissions": set.to_strings() })))
}

/// DELETE /rbac/roles/:id/permissions/:permission_id
pub async fn revoke_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, permission_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: RoleId = parse_id(&id)?;
    let permission_id: PermissionId = parse_id(&permission_id)?;
    services.admin.revoke_permission(id, permission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Permissions

/// GET /rbac/permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let permissions = services.admin.list_permissions().await?;
    Ok(Json(json!({
        "permissions": permissions.iter().map(dto::permission_json).collect::<Vec<_>>()
    })))
}

/// POST /rbac/permissions
pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let permission = services.admin.create_permission(body.into_new_permission()?).await?;
    Ok((StatusCode::CREATED, Json(dto::permission_json(&permission))))
}

/// GET /rbac/permissions/:id
pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let id: PermissionId = parse_id(&id)?;
    let permission = services.admin.get_permission(id).await?;
    Ok(Json(dto::permission_json(&permission)))
}

/// PUT /rbac/permissions/:id - display name and description
pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(update): Json<PermissionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: PermissionId = parse_id(&id)?;
    let permission = services.admin.update_permission(id, update).await?;
    Ok(Json(dto::permission_json(&permission)))
}

/// DELETE /rbac/permissions/:id - also drops every role link to it
pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &MANAGE_ROLES).await?;
    let id: PermissionId = parse_id(&id)?;
    services.admin.delete_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /rbac/explain?permission=X - why the caller is allowed or denied
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&services, &principal, &VIEW_USERS).await?;
    let permission = Permission::parse(query.permission).map_err(|e| ApiError(e.into()))?;
    let explanation = services.engine.explain(Some(principal.principal()), &permission).await?;
    Ok(Json(explanation))
}
