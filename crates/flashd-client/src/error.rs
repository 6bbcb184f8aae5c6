//! Error types for flash client operations

use thiserror::Error;

/// Result type alias for flash client operations
pub type Result<T> = std::result::Result<T, FlashClientError>;

/// Errors that can occur during flash client operations
#[derive(Error, Debug)]
pub enum FlashClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error (reading the local image)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server rejected the request before streaming
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// A stream line was not a valid record
    #[error("Failed to parse record: {0}")]
    ParseError(String),

    /// Stream ended without a completion record
    #[error("Stream ended without a completion record")]
    IncompleteStream,
}

impl FlashClientError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }
}
