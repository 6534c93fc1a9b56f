//! REST API server module
//!
//! Exposes the dispatcher's operations over HTTP: batch jobs, direct
//! mappings and tag updates, endpoint verification and monitoring.

use crate::log_buffer::LogBuffer;
use crate::{Config, Dispatcher, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /jobs/range` - Start a range-driven job (202, or 409 while another runs)
/// - `POST /jobs/count` - Start a count-driven job (202, or 409 while another runs)
/// - `GET /progress` - Progress of the current job
/// - `GET /jobs/last` - Report of the last finished job
/// - `POST /jobs/stop` - Cooperative stop
/// - `POST /jobs/emergency-stop` - Forced reset
///
/// ## Direct delivery
/// - `POST /mappings/single` - Send one binding
/// - `POST /tags/users` - User tag update
/// - `POST /tags/addresses` - Address tag update
///
/// ## Agent
/// - `POST /agent/verify` - Verify (or force-accept) the Agent endpoint
/// - `GET /status` - Service status
/// - `GET /certs/status` - Client credential presence
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /logs` - Recent log lines
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(dispatcher: Arc<Dispatcher>, config: Arc<Config>, logs: LogBuffer) -> Router {
    let state = AppState::new(dispatcher, config.clone(), logs);

    let router = Router::new()
        // Jobs
        .route("/jobs/range", post(routes::start_range_job))
        .route("/jobs/count", post(routes::start_count_job))
        .route("/jobs/last", get(routes::last_report))
        .route("/jobs/stop", post(routes::stop_job))
        .route("/jobs/emergency-stop", post(routes::emergency_stop))
        .route("/progress", get(routes::get_progress))
        // Direct delivery
        .route("/mappings/single", post(routes::send_single_mapping))
        .route("/tags/users", post(routes::update_user_tags))
        .route("/tags/addresses", post(routes::update_address_tags))
        // Agent
        .route("/agent/verify", post(routes::verify_agent))
        .route("/status", get(routes::agent_status))
        .route("/certs/status", get(routes::cert_status))
        // System
        .route("/health", get(routes::health_check))
        .route("/logs", get(routes::get_logs))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails. See [`start_api_server_with_shutdown`] for a
/// server that stops on a signal.
///
/// # Example
///
/// ```no_run
/// use uid_bridge::{Config, Dispatcher};
/// use uid_bridge::log_buffer::LogBuffer;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let dispatcher = Arc::new(Dispatcher::with_legacy_tls((*config).clone())?);
///
/// // Start API server (blocks until the server stops)
/// uid_bridge::api::start_api_server(dispatcher, config, LogBuffer::new(50)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    dispatcher: Arc<Dispatcher>,
    config: Arc<Config>,
    logs: LogBuffer,
) -> Result<()> {
    start_api_server_with_shutdown(dispatcher, config, logs, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` resolves
pub async fn start_api_server_with_shutdown<F>(
    dispatcher: Arc<Dispatcher>,
    config: Arc<Config>,
    logs: LogBuffer,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(dispatcher, config, logs);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
