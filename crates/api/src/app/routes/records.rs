//! Generic tenant-scoped record endpoints (`/crud/:entity`).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;

use platform_auth::{AccessError, JsonMap, ListQuery, RecordOperation};
use platform_core::RecordId;
use platform_infra::RecordOutcome;

use crate::app::dto::records_json;
use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/:entity", get(list_records).post(create_record))
        .route("/:entity/:id", get(get_record).put(update_record).delete(delete_record))
}

/// GET /crud/:entity?offset=&limit=&field=value
pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let query = list_query(params)?;
    let outcome = services
        .records
        .execute(principal.principal(), &entity, RecordOperation::List(query))
        .await?;
    Ok(render(outcome))
}

/// POST /crud/:entity
pub async fn create_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let payload = object(body)?;
    let outcome = services
        .records
        .execute(principal.principal(), &entity, RecordOperation::Create { payload })
        .await?;
    Ok(render(outcome))
}

/// GET /crud/:entity/:id
pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id: RecordId = parse_id(&id)?;
    let outcome = services
        .records
        .execute(principal.principal(), &entity, RecordOperation::Get { id })
        .await?;
    Ok(render(outcome))
}

/// PUT /crud/:entity/:id
pub async fn update_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((entity, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let id: RecordId = parse_id(&id)?;
    let payload = object(body)?;
    let outcome = services
        .records
        .execute(principal.principal(), &entity, RecordOperation::Update { id, payload })
        .await?;
    Ok(render(outcome))
}

/// DELETE /crud/:entity/:id
pub async fn delete_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id: RecordId = parse_id(&id)?;
    let outcome = services
        .records
        .execute(principal.principal(), &entity, RecordOperation::Delete { id })
        .await?;
    Ok(render(outcome))
}

fn render(outcome: RecordOutcome) -> Response {
    match outcome {
        RecordOutcome::Listed(rows) => Json(records_json(&rows)).into_response(),
        RecordOutcome::Found(row) | RecordOutcome::Updated(row) => Json(row.to_json()).into_response(),
        RecordOutcome::Created(row) => (StatusCode::CREATED, Json(row.to_json())).into_response(),
        RecordOutcome::Deleted => StatusCode::NO_CONTENT.into_response(),
    }
}

fn object(body: Value) -> Result<JsonMap, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError(AccessError::validation("request body must be a JSON object"))),
    }
}

/// `offset` and `limit` page; every other parameter is an equality filter.
/// Values are read as JSON where they parse (`active=true`, `seats=5`) and as
/// strings otherwise.
fn list_query(params: HashMap<String, String>) -> Result<ListQuery, ApiError> {
    let mut filters = JsonMap::new();
    let mut offset = None;
    let mut limit = None;

    for (key, raw) in params {
        match key.as_str() {
            "offset" => offset = Some(parse_number("offset", &raw)?),
            "limit" => limit = Some(parse_number("limit", &raw)?),
            _ => {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                filters.insert(key, value);
            }
        }
    }

    Ok(ListQuery::new(filters, offset, limit))
}

fn parse_number(name: &str, raw: &str) -> Result<u32, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError(AccessError::validation(format!("{name} must be a non-negative integer"))))
}
