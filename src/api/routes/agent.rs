//! Agent endpoint handlers.

use super::CertStatusQuery;
use crate::api::AppState;
use crate::types::VerifyRequest;
use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};

/// POST /agent/verify - Verify and store the Agent endpoint
///
/// With `force` the endpoint is stored without probing it.
#[utoipa::path(
    post,
    path = "/agent/verify",
    tag = "agent",
    request_body = crate::types::VerifyRequest,
    responses(
        (status = 200, description = "Endpoint verified and stored", body = crate::dispatcher::VerifyOutcome),
        (status = 400, description = "Malformed endpoint (forced verification)", body = crate::error::ApiError),
        (status = 502, description = "A probe stage failed; details.stage names it", body = crate::error::ApiError)
    )
)]
pub async fn verify_agent(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    match state.dispatcher.verify_endpoint(request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /status - Service status
#[utoipa::path(
    get,
    path = "/status",
    tag = "agent",
    responses(
        (status = 200, description = "Service status", body = crate::types::AgentStatus)
    )
)]
pub async fn agent_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.agent_status())
}

/// GET /certs/status - Presence of the client credential files
#[utoipa::path(
    get,
    path = "/certs/status",
    tag = "agent",
    params(
        ("bundle" = Option<String>, Query, description = "Bundle name (default: configured bundle)")
    ),
    responses(
        (status = 200, description = "Credential file presence", body = crate::transport::CertStatus)
    )
)]
pub async fn cert_status(
    State(state): State<AppState>,
    Query(query): Query<CertStatusQuery>,
) -> impl IntoResponse {
    Json(state.dispatcher.cert_status(query.bundle.as_deref()).await)
}
