//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the uid-bridge control
//! surface using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the uid-bridge REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "uid-bridge REST API",
        version = "0.1.0",
        description = "Control surface for batch address/identity binding jobs, direct mappings and tag updates delivered to a User-ID Agent",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local service")
    ),
    paths(
        // Jobs
        crate::api::routes::start_range_job,
        crate::api::routes::start_count_job,
        crate::api::routes::get_progress,
        crate::api::routes::last_report,
        crate::api::routes::stop_job,
        crate::api::routes::emergency_stop,

        // Direct delivery
        crate::api::routes::send_single_mapping,
        crate::api::routes::update_user_tags,
        crate::api::routes::update_address_tags,

        // Agent
        crate::api::routes::verify_agent,
        crate::api::routes::agent_status,
        crate::api::routes::cert_status,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_logs,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            // Core types
            crate::types::JobId,
            crate::types::BindAction,
            crate::types::TagAction,
            crate::types::Entry,
            crate::types::TagEntry,
            crate::types::JobShape,
            crate::types::EngineState,
            crate::types::JobOutcome,
            crate::types::Progress,
            crate::types::BatchFailure,
            crate::types::JobReport,
            crate::types::AgentResponse,
            crate::types::AgentStatus,
            crate::types::ProbeStage,
            crate::types::Event,

            // Requests
            crate::types::RangeJobSpec,
            crate::types::CountJobSpec,
            crate::types::SingleMappingRequest,
            crate::types::TagRequest,
            crate::types::VerifyRequest,

            // Responses
            crate::api::routes::JobStartedResponse,
            crate::api::routes::StopResponse,
            crate::api::routes::CertStatusQuery,
            crate::api::routes::LogsResponse,
            crate::dispatcher::VerifyOutcome,
            crate::transport::CertStatus,

            // Config types
            crate::config::Config,
            crate::config::AgentConfig,
            crate::config::TlsPolicy,
            crate::config::MinTlsVersion,
            crate::config::DispatchConfig,
            crate::config::CertConfig,
            crate::config::LogConfig,
            crate::config::ServerIntegrationConfig,
            crate::config::ApiConfig,

            // Error types
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "jobs", description = "Batch jobs: start, stop, progress and reports"),
        (name = "mappings", description = "Single mappings and tag updates sent straight to the Agent"),
        (name = "agent", description = "Agent endpoint verification and status"),
        (name = "system", description = "Health, logs, events and API documentation")
    )
)]
pub struct ApiDoc;
