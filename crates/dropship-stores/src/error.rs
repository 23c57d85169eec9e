//! Store error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while shaping, transmitting or interpreting a deploy
#[derive(Debug, Error)]
pub enum StoreError {
    /// Required configuration missing or malformed
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Non-2xx response from a backend
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// The artifact could not be used for this backend
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// A file form field could not be opened or streamed
    #[error("Failed to read form field '{field}' from {}: {source}", path.display())]
    FormField {
        field: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Request never produced a response (connection, TLS, timeout)
    #[error("Transport error while {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered but the body was not what we expected
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Operation poller gave up after consecutive failed GETs
    #[error("Operation {operation} failed {failures} consecutive polls: {last_error}")]
    OperationRetryExceeded {
        operation: String,
        failures: u32,
        last_error: String,
    },

    /// Operation poller hit its overall deadline
    #[error("Operation {operation} did not finish within {deadline:?}")]
    OperationTimedOut { operation: String, deadline: Duration },

    /// The polled operation finished with an error status
    #[error("Operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// Local distribution policy rejected the copy/move
    #[error("Local distribution failed: {0}")]
    LocalDistribution(String),

    /// Required tool not found
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// External command execution failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error came out of the operation poller
    pub fn is_poller_failure(&self) -> bool {
        matches!(
            self,
            Self::OperationRetryExceeded { .. } | Self::OperationTimedOut { .. }
        )
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
