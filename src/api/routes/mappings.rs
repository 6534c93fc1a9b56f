//! Direct delivery handlers: single mappings and tag updates.

use crate::api::AppState;
use crate::error::Error;
use crate::types::{SingleMappingRequest, TagRequest};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};

/// POST /mappings/single - Send one binding immediately
#[utoipa::path(
    post,
    path = "/mappings/single",
    tag = "mappings",
    request_body = crate::types::SingleMappingRequest,
    responses(
        (status = 200, description = "Agent accepted the mapping", body = crate::types::AgentResponse),
        (status = 400, description = "Invalid address, user name or endpoint", body = crate::error::ApiError),
        (status = 412, description = "Client credentials missing", body = crate::error::ApiError),
        (status = 502, description = "Agent unreachable or reported an error", body = crate::error::ApiError)
    )
)]
pub async fn send_single_mapping(
    State(state): State<AppState>,
    Json(request): Json<SingleMappingRequest>,
) -> Response {
    match state.dispatcher.send_single(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /tags/users - Register or unregister user tags
#[utoipa::path(
    post,
    path = "/tags/users",
    tag = "mappings",
    request_body = crate::types::TagRequest,
    responses(
        (status = 200, description = "Agent accepted the tags", body = crate::types::AgentResponse),
        (status = 400, description = "Invalid action, items or endpoint", body = crate::error::ApiError),
        (status = 502, description = "Agent unreachable or reported an error", body = crate::error::ApiError)
    )
)]
pub async fn update_user_tags(
    State(state): State<AppState>,
    Json(request): Json<TagRequest>,
) -> Response {
    if !request.action.targets_users() {
        return Error::Validation(format!(
            "{} is an address-tag action; use /tags/addresses",
            request.action
        ))
        .into_response();
    }
    deliver_tags(state, request).await
}

/// POST /tags/addresses - Register or unregister address tags
#[utoipa::path(
    post,
    path = "/tags/addresses",
    tag = "mappings",
    request_body = crate::types::TagRequest,
    responses(
        (status = 200, description = "Agent accepted the tags", body = crate::types::AgentResponse),
        (status = 400, description = "Invalid action, items or endpoint", body = crate::error::ApiError),
        (status = 502, description = "Agent unreachable or reported an error", body = crate::error::ApiError)
    )
)]
pub async fn update_address_tags(
    State(state): State<AppState>,
    Json(request): Json<TagRequest>,
) -> Response {
    if request.action.targets_users() {
        return Error::Validation(format!(
            "{} is a user-tag action; use /tags/users",
            request.action
        ))
        .into_response();
    }
    deliver_tags(state, request).await
}

async fn deliver_tags(state: AppState, request: TagRequest) -> Response {
    match state.dispatcher.send_tags(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}
