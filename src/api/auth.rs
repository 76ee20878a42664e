//! Session bearer authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use super::ApiState;
use crate::Error;

/// Extract a bearer token from an Authorization header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware requiring a valid session token.
///
/// On success the validated `SessionContext` is attached to the request
/// for handlers to extract; otherwise the request fails with
/// `AUTHENTICATION_ERROR`.
pub async fn require_session(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Error> {
    let Some(token) = bearer_token(req.headers()) else {
        return Err(Error::Authentication("missing bearer token".to_string()));
    };

    let session = state.sessions.validate(token)?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(bearer_token(&headers), Some("tok-123"));

        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }
}
