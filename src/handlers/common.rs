use crate::errors::ServiceError;
use crate::ApiResponse;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

/// Header carrying the opaque cart session token.
pub const CART_SESSION_HEADER: &str = "x-cart-session";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Success response with a human-readable message
pub fn message_response<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success_with_message(data, message)),
    )
        .into_response()
}

/// Validate request input before any work happens.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Extract the cart session id from the request headers, if present and
/// well-formed.
pub fn cart_session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

/// Like [`cart_session_id`] but an error when the header is missing.
pub fn require_cart_session(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    cart_session_id(headers)
        .ok_or_else(|| ServiceError::NotFound("Cart session not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cart_session_header_parses() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert(
            CART_SESSION_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(cart_session_id(&headers), Some(id));
    }

    #[test]
    fn malformed_cart_session_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(CART_SESSION_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_eq!(cart_session_id(&headers), None);
        assert!(require_cart_session(&headers).is_err());
    }
}
