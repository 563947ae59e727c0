//! Error types for vantiq-link.
//!
//! Server-reported failures of REST and document operations are *not*
//! errors at this level: they come back as a failed
//! [`VantiqResponse`](crate::models::VantiqResponse) carrying the server's
//! error records. [`VantiqError`] is reserved for client-side misuse and
//! unrecoverable transport problems, or for callers that explicitly convert
//! a failed response via
//! [`VantiqResponse::error_for_status`](crate::models::VantiqResponse::error_for_status).

use thiserror::Error;

/// Errors raised by the Vantiq client.
#[derive(Error, Debug)]
pub enum VantiqError {
    /// Credentials rejected, or the access token is expired/invalid.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The requested resource instance does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource kind is not recognized by the server.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Malformed request, e.g. conflicting upload sources.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Socket, TLS, or HTTP transport failure (including certificate
    /// fingerprint mismatches).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Server-side failure (5xx or an unclassified error response).
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),
}

impl From<reqwest::Error> for VantiqError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VantiqError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            VantiqError::SerializationError(err.to_string())
        } else {
            VantiqError::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VantiqError {
    fn from(err: serde_json::Error) -> Self {
        VantiqError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VantiqError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        VantiqError::TransportError(err.to_string())
    }
}

/// Result type for Vantiq client operations.
pub type Result<T> = std::result::Result<T, VantiqError>;
