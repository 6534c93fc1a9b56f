//! Error types for uid-bridge
//!
//! This module provides the error taxonomy for the library:
//! - [`TransportError`] classifies every way a single delivery to the Agent can fail
//! - [`Error`] is the crate-level error returned by dispatcher and API operations
//! - HTTP status code mapping and structured JSON error bodies for the control surface
//!
//! A cancelled job is not an error. Cancellation is reported as
//! [`JobOutcome::Cancelled`](crate::types::JobOutcome::Cancelled).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{JobId, ProbeStage};

/// Result type alias for uid-bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for uid-bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "dispatch.default_batch_size")
        key: Option<String>,
    },

    /// Delivery to the Agent failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A job is already running; start requests are rejected, never queued
    #[error("a job is already running (job {job_id})")]
    AlreadyRunning {
        /// The job currently holding the engine
        job_id: JobId,
    },

    /// Request input was rejected before any work started
    #[error("validation error: {0}")]
    Validation(String),

    /// Endpoint verification failed at a specific probe stage
    #[error("[{stage}] {message}")]
    Verification {
        /// The probe stage that failed
        stage: ProbeStage,
        /// What went wrong at that stage
        message: String,
    },

    /// A uid-message document could not be decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Failure of a single document delivery to the Agent
///
/// Variants are ordered roughly by how far the delivery got: endpoint and
/// credential problems are detected before any connection is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint is not a `host:port` pair
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint string as supplied
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// One or more credential files are absent
    #[error("missing certificate files: {}", display_paths(.missing))]
    MissingCredentials {
        /// Every expected file that does not exist
        missing: Vec<PathBuf>,
    },

    /// TLS setup or handshake failed
    #[error("TLS error for {endpoint} (check Agent certificate / root CA): {reason}")]
    TlsError {
        /// The endpoint being contacted
        endpoint: String,
        /// Underlying TLS failure
        reason: String,
    },

    /// Connection refused, reset or timed out
    #[error("connection error for {endpoint}: {reason}")]
    ConnectionError {
        /// The endpoint being contacted
        endpoint: String,
        /// Underlying network failure
        reason: String,
    },

    /// Agent answered with an HTTP error status
    #[error("HTTP {code}: {reason}")]
    HttpError {
        /// HTTP status code
        code: u16,
        /// Reason phrase
        reason: String,
    },

    /// Agent reported an error inside a well-formed response
    #[error("UIA Agent error: {message}")]
    AgentError {
        /// The embedded result text, or the raw body when absent
        message: String,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "already_running",
///     "message": "a job is already running (job 3)",
///     "details": { "job_id": 3 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_endpoint", "already_running")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for TransportError {
    fn status_code(&self) -> u16 {
        match self {
            TransportError::InvalidEndpoint { .. } => 400,
            // The service is missing its own client credentials
            TransportError::MissingCredentials { .. } => 412,
            TransportError::TlsError { .. }
            | TransportError::ConnectionError { .. }
            | TransportError::HttpError { .. }
            | TransportError::AgentError { .. } => 502,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            TransportError::InvalidEndpoint { .. } => "invalid_endpoint",
            TransportError::MissingCredentials { .. } => "missing_credentials",
            TransportError::TlsError { .. } => "tls_error",
            TransportError::ConnectionError { .. } => "connection_error",
            TransportError::HttpError { .. } => "http_error",
            TransportError::AgentError { .. } => "agent_error",
        }
    }
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,
            Error::Transport(e) => e.status_code(),
            Error::AlreadyRunning { .. } => 409,
            Error::Verification { .. } => 502,
            Error::Protocol(_) => 500,
            Error::NotFound(_) => 404,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Transport(e) => e.error_code(),
            Error::AlreadyRunning { .. } => "already_running",
            Error::Verification { .. } => "verification_failed",
            Error::Protocol(_) => "protocol_error",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::AlreadyRunning { job_id } => Some(serde_json::json!({
                "job_id": job_id,
            })),
            Error::Verification { stage, .. } => Some(serde_json::json!({
                "stage": stage,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Transport(TransportError::MissingCredentials { missing }) => {
                Some(serde_json::json!({
                    "missing": missing,
                }))
            }
            Error::Transport(TransportError::HttpError { code, reason }) => {
                Some(serde_json::json!({
                    "http_status": code,
                    "reason": reason,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
