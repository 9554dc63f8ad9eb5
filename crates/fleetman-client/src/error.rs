//! Error types for the fleetman client

use thiserror::Error;

/// Errors that can occur when using the fleetman client
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Base URL cannot carry path segments
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),

    /// Gave up waiting for a batch
    #[error("Timed out waiting for batch")]
    Timeout,

    /// API returned an error status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error code from the response body, if any
        code: Option<String>,
        /// Error message from server
        message: String,
    },
}

impl ClientError {
    /// Whether the daemon refused because a batch is already running
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Api { status: 409, .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
