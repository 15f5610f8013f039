use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use platform_auth::{AccessError, AuthenticationError};

/// Handler error: an [`AccessError`] rendered as a JSON body.
#[derive(Debug)]
pub struct ApiError(pub AccessError);

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        access_error_response(self.0)
    }
}

pub fn access_error_response(err: AccessError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        AccessError::Authentication(AuthenticationError::InvalidCredential(_)) => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credential", message)
        }
        AccessError::Authentication(AuthenticationError::PrincipalNotFound) => {
            json_error(StatusCode::UNAUTHORIZED, "principal_not_found", message)
        }
        AccessError::Authentication(AuthenticationError::PrincipalInactive) => {
            json_error(StatusCode::FORBIDDEN, "principal_inactive", message)
        }
        AccessError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        AccessError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        AccessError::RoleInUse { .. } => json_error(StatusCode::CONFLICT, "role_in_use", message),
        AccessError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        AccessError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        AccessError::Unavailable(_) => {
            // Store details stay in the logs.
            tracing::error!(error = %message, "authorization store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "service unavailable")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: AccessError) -> StatusCode {
        access_error_response(err).status()
    }

    #[test]
    fn access_errors_map_to_statuses() {
        assert_eq!(
            status(AuthenticationError::InvalidCredential("bad".into()).into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(AuthenticationError::PrincipalNotFound.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthenticationError::PrincipalInactive.into()), StatusCode::FORBIDDEN);
        assert_eq!(status(AccessError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(AccessError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AccessError::RoleInUse {
                role: "USER".into(),
                principals: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(AccessError::Conflict("dup".into())), StatusCode::CONFLICT);
        assert_eq!(status(AccessError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AccessError::Unavailable("down".into())), StatusCode::SERVICE_UNAVAILABLE);
    }
}
