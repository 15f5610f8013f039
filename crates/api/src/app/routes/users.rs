//! User administration endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use platform_core::PrincipalId;
use platform_infra::PrincipalPatch;

use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/count", get(count_users))
        .route("/:id", get(get_user).patch(update_user).delete(delete_user))
}

/// GET /users?offset=&limit=
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = services
        .users
        .list_users(principal.principal(), page.offset, page.limit)
        .await?;
    Ok(Json(users))
}

/// GET /users/count
pub async fn count_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<impl IntoResponse, ApiError> {
    let count = services.users.count_users(principal.principal()).await?;
    Ok(Json(json!({ "count": count })))
}

/// GET /users/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: PrincipalId = parse_id(&id)?;
    let user = services.users.get_user(principal.principal(), id).await?;
    Ok(Json(user))
}

/// PATCH /users/:id - change role, active flag or name
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(patch): Json<PrincipalPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id: PrincipalId = parse_id(&id)?;
    let user = services.users.update_user(principal.principal(), id, patch).await?;
    Ok(Json(user))
}

/// DELETE /users/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: PrincipalId = parse_id(&id)?;
    services.users.delete_user(principal.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
