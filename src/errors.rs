use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human-readable error description
    #[schema(example = "Session 42 is not available")]
    pub error: String,
    /// Additional detail, e.g. a field -> message map for validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient inventory: {0}")]
    InsufficientStock(String),

    #[error("Session full: {0}")]
    SessionFull(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidFields(_) | Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidOperation(_)
            | Self::InvalidInput(_)
            | Self::InsufficientStock(_)
            | Self::SessionFull(_)
            | Self::PaymentFailed(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::DatabaseError(_)
            | Self::ExternalServiceError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Internal errors collapse to a
    /// generic message so implementation details never leak to the caller.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::EventError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::ExternalServiceError(_) => "Upstream service error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured detail attached to the response, currently only the
    /// field -> message map of a failed validation.
    fn response_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidFields(errors) => serde_json::to_value(errors.field_errors()).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.response_message(),
            details: self.response_details(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidOperation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::SessionFull("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_messages_are_generic() {
        assert_eq!(
            ServiceError::InternalError("connection pool poisoned".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("secret".into())).response_message(),
            "Database error"
        );
        // Domain errors keep their message
        assert_eq!(
            ServiceError::SessionFull("Session 7 is already full".into()).response_message(),
            "Session full: Session 7 is already full"
        );
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(email)]
        email: String,
    }

    #[tokio::test]
    async fn validation_errors_carry_field_details() {
        let err = Probe {
            email: "not-an-email".into(),
        }
        .validate()
        .unwrap_err();

        let response = ServiceError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!payload.success);
        let details = payload.details.expect("details expected");
        assert!(details.get("email").is_some());
    }
}
