//! API error types and conversions

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flashd_core::FlashError;
use serde::Serialize;

/// API error type that converts to HTTP responses
///
/// Only failures detected before a flash stream starts surface here; anything
/// after that is reported inside the stream as a completion record.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request
    BadRequest(String),
    /// 404 Not Found
    NotFound(String),
    /// 413 Payload Too Large
    PayloadTooLarge(String),
    /// 503 Service Unavailable (programmer misconfigured)
    ServiceUnavailable(String),
    /// 500 Internal Server Error
    Internal(String),
}

/// Standard error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        if status.is_server_error() {
            tracing::error!(error = error_type, %message, "API error");
        } else if status.is_client_error() {
            tracing::debug!(error = error_type, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<FlashError> for ApiError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::InvalidInput(msg) => ApiError::BadRequest(msg),
            e @ FlashError::ImageNotFound(_) => ApiError::NotFound(e.to_string()),
            e @ FlashError::ProgrammerNotFound(_) => ApiError::ServiceUnavailable(e.to_string()),
            FlashError::Staging(e) => ApiError::Internal(format!("Failed to stage image: {}", e)),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flash_error_mapping() {
        let invalid = ApiError::from(FlashError::InvalidInput("file type must be ELF (.elf)".into()));
        assert!(matches!(invalid, ApiError::BadRequest(ref m) if m == "file type must be ELF (.elf)"));

        let image = ApiError::from(FlashError::ImageNotFound(PathBuf::from("/tmp/x.elf")));
        assert!(matches!(image, ApiError::NotFound(_)));

        let programmer = ApiError::from(FlashError::ProgrammerNotFound(PathBuf::from("/opt/openocd")));
        assert!(matches!(programmer, ApiError::ServiceUnavailable(ref m) if m.contains("/opt/openocd")));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PayloadTooLarge("x".into()).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
