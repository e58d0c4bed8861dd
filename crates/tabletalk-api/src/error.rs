//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tabletalk_chat::ChatError;
use tabletalk_core::error::TabletalkError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 413 Payload Too Large - upload over the configured limit.
    PayloadTooLarge(String),
    /// 422 Unprocessable Entity - bytes arrived but could not be parsed as
    /// a supported data format.
    UnprocessableEntity(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            ChatError::Format(msg) => ApiError::UnprocessableEntity(msg.clone()),
            ChatError::Storage(msg) => ApiError::Internal(msg.clone()),
        }
    }
}

impl From<TabletalkError> for ApiError {
    fn from(err: TabletalkError) -> Self {
        match &err {
            TabletalkError::Format(msg) => ApiError::UnprocessableEntity(msg.clone()),
            TabletalkError::PayloadTooLarge { .. } => {
                ApiError::PayloadTooLarge(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_chat_error_mapping() {
        assert!(matches!(
            ApiError::from(ChatError::EmptyMessage),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::SessionNotFound(Uuid::new_v4())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::Format("bad csv".to_string())),
            ApiError::UnprocessableEntity(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::Storage("oops".to_string())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_core_error_mapping() {
        assert!(matches!(
            ApiError::from(TabletalkError::Format("nope".to_string())),
            ApiError::UnprocessableEntity(_)
        ));
        assert!(matches!(
            ApiError::from(TabletalkError::PayloadTooLarge { size: 2, limit: 1 }),
            ApiError::PayloadTooLarge(_)
        ));
        assert!(matches!(
            ApiError::from(TabletalkError::Storage("disk".to_string())),
            ApiError::Internal(_)
        ));
    }
}
