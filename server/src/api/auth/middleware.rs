//! Authentication middleware

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::basic::Authorizer;

/// Authentication error response
#[derive(Debug)]
pub struct AuthError {
    challenge: String,
}

impl AuthError {
    pub fn required(challenge: String) -> Self {
        Self { challenge }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "unauthorized",
            "code": "AUTH_REQUIRED",
            "message": "Authentication required",
        }));
        let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Shared authorizer handed to the middleware
pub type AuthState = Arc<dyn Authorizer>;

/// Reject requests the authorizer does not accept
pub async fn require_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !auth.is_enabled() || auth.authorize(request.headers()) {
        return Ok(next.run(request).await);
    }

    tracing::debug!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rejected unauthenticated request"
    );
    Err(AuthError::required(auth.challenge()))
}
