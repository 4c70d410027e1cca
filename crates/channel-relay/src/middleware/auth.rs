//! Consumer token extraction and rejection responses.

use crate::domain::error::{codes, ApiError, AuthError};
use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Dedicated token header.
pub const TOKEN_HEADER: &str = "x-relay-token";

/// Token from `X-Relay-Token`, falling back to `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Handshake rejection: 401 for bad tokens, 503 while signing is unavailable.
pub fn auth_rejection(error: &AuthError) -> Response {
    let status = match error {
        AuthError::Rejected(_) => StatusCode::UNAUTHORIZED,
        AuthError::AuthUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let mut response = (status, Json(ApiError::from(error).to_json())).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// 400 for a handshake that carried no token at all.
pub fn missing_token() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(
            ApiError::new(
                codes::MISSING_TOKEN,
                "provide the channel token in X-Relay-Token or Authorization: Bearer",
            )
            .to_json(),
        ),
    )
        .into_response()
}
