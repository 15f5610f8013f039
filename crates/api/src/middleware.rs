use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use platform_auth::AccessError;
use platform_infra::PrincipalResolver;

use crate::app::errors::{access_error_response, json_error};
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub resolver: PrincipalResolver,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .map_err(|msg| json_error(StatusCode::UNAUTHORIZED, "invalid_credential", msg))?;

    let principal = state.resolver.resolve(token).await.map_err(|err| {
        match &err {
            AccessError::Unavailable(_) => warn!(error = %err, "principal resolution failed"),
            _ => debug!(error = %err, "request not authenticated"),
        }
        access_error_response(err)
    })?;

    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing authorization header")?;

    let header = header.to_str().map_err(|_| "authorization header is not valid ASCII")?;

    let header = header.strip_prefix("Bearer ").ok_or("expected a bearer token")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    use super::*;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Ok("abc.def"));
    }
}
