//! Error types for CI transport operations

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors surfaced to the transport's caller
#[derive(Error, Debug)]
pub enum TransportError {
    /// Caller broke the open/flash/write/read ordering
    #[error("Transport usage error: {0}")]
    Usage(String),

    /// Transport is closed or has no firmware to submit
    #[error("Transport closed")]
    Closed,

    /// Deadline elapsed, or the task finished without producing output
    #[error("I/O timeout during {operation}")]
    IoTimeout { operation: &'static str },

    /// Firmware image could not be located or read
    #[error("Firmware {path} unavailable: {source}")]
    Firmware {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration cannot be used to talk to the CI service
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TransportError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::IoTimeout { .. })
    }
}

/// Errors from a single exchange with the CI service
///
/// These never reach the transport's caller: the submission and polling
/// loops retry them until the caller's deadline.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body was not the expected shape
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Task output was not valid base64
    #[error("Failed to decode task output: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Mock service has been told to fail
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }
}
