//! Error types for HTTP operations.

use thiserror::Error;

use super::hostmatch::HostMatchError;

/// Error type for HTTP operations.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network connection failed.
    ///
    /// This includes DNS resolution failures and connection refused.
    #[error("Connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request timed out.
    ///
    /// The server did not respond within the configured timeout period.
    #[error("Request timed out")]
    Timeout,

    /// The response arrived but its body could not be read.
    #[error("read body: {0}")]
    ReadBody(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The provided URL is invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The engine shut down while the request was in flight.
    #[error("Request cancelled")]
    Cancelled,

    /// The destination is not permitted by the host allow-list.
    #[error("webhook can only call allowed HTTP servers (check your {setting} setting), deny '{host}'")]
    PolicyViolation { setting: String, host: String },
}

/// Error building the shared client at startup.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    AllowList(#[from] HostMatchError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
