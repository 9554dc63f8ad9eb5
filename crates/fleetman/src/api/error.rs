//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleetman_api::responses::ErrorBody;
use fleetman_core::CoreError;

/// Error response with its status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorBody,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.operator_message();
        match err {
            CoreError::BatchActive => Self::new(StatusCode::CONFLICT, "BATCH_ACTIVE", message),
            CoreError::DeviceNotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            CoreError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
            }
            CoreError::QueueFailed { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "QUEUE_FAILED", message)
            }
            _ => Self::internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::BatchActive, StatusCode::CONFLICT),
            (CoreError::DeviceNotFound("r9".into()), StatusCode::NOT_FOUND),
            (CoreError::InvalidRequest("empty".into()), StatusCode::BAD_REQUEST),
            (CoreError::Storage("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_body_carries_message() {
        let err = AppError::from(CoreError::DeviceNotFound("r9".into()));
        assert_eq!(err.error.code, "NOT_FOUND");
        assert_eq!(err.error.message, "device not found: r9");
    }
}
