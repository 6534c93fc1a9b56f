//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Job start, stop, emergency stop, progress and reports
//! - [`mappings`] — Single mappings and tag updates sent straight to the Agent
//! - [`agent`] — Endpoint verification, service status, certificate status
//! - [`system`] — Health, logs, events, OpenAPI

use crate::types::JobId;
use serde::{Deserialize, Serialize};

mod agent;
mod jobs;
mod mappings;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use agent::*;
pub use jobs::*;
pub use mappings::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Response for POST /jobs/range and POST /jobs/count
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct JobStartedResponse {
    /// Identifier of the started job
    pub job_id: JobId,
}

/// Response for POST /jobs/stop and POST /jobs/emergency-stop
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StopResponse {
    /// Whether a job was active when the request arrived
    pub stopped: bool,
    /// The job that was signalled, if any
    pub job_id: Option<JobId>,
}

/// Query parameters for GET /certs/status
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CertStatusQuery {
    /// Bundle name (default: the configured bundle)
    pub bundle: Option<String>,
}

/// Response for GET /logs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LogsResponse {
    /// Buffered lines, oldest first
    pub lines: Vec<String>,
    /// Maximum number of lines kept
    pub capacity: usize,
}
