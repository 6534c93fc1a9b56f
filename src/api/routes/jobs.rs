//! Job handlers.

use super::{JobStartedResponse, StopResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{CountJobSpec, RangeJobSpec};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /jobs/range - Start a range-driven job
#[utoipa::path(
    post,
    path = "/jobs/range",
    tag = "jobs",
    request_body = crate::types::RangeJobSpec,
    responses(
        (status = 202, description = "Job started", body = JobStartedResponse),
        (status = 400, description = "Invalid network, batch size or endpoint", body = crate::error::ApiError),
        (status = 409, description = "Another job is running", body = crate::error::ApiError)
    )
)]
pub async fn start_range_job(
    State(state): State<AppState>,
    Json(spec): Json<RangeJobSpec>,
) -> Response {
    match state.dispatcher.start_range_job(spec).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(JobStartedResponse { job_id })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /jobs/count - Start a count-driven job
#[utoipa::path(
    post,
    path = "/jobs/count",
    tag = "jobs",
    request_body = crate::types::CountJobSpec,
    responses(
        (status = 202, description = "Job started", body = JobStartedResponse),
        (status = 400, description = "Invalid base address, count or endpoint", body = crate::error::ApiError),
        (status = 409, description = "Another job is running", body = crate::error::ApiError)
    )
)]
pub async fn start_count_job(
    State(state): State<AppState>,
    Json(spec): Json<CountJobSpec>,
) -> Response {
    match state.dispatcher.start_count_job(spec).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(JobStartedResponse { job_id })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /progress - Progress of the current job
#[utoipa::path(
    get,
    path = "/progress",
    tag = "jobs",
    responses(
        (status = 200, description = "Current progress", body = crate::types::Progress)
    )
)]
pub async fn get_progress(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.get_progress())
}

/// GET /jobs/last - Report of the most recently finished job
#[utoipa::path(
    get,
    path = "/jobs/last",
    tag = "jobs",
    responses(
        (status = 200, description = "Last job report", body = crate::types::JobReport),
        (status = 404, description = "No job has finished yet", body = crate::error::ApiError)
    )
)]
pub async fn last_report(State(state): State<AppState>) -> Response {
    match state.dispatcher.last_report() {
        Some(report) => Json(report).into_response(),
        None => Error::NotFound("job report".into()).into_response(),
    }
}

/// POST /jobs/stop - Request cooperative termination of the running job
#[utoipa::path(
    post,
    path = "/jobs/stop",
    tag = "jobs",
    responses(
        (status = 200, description = "Stop signalled (or nothing was running)", body = StopResponse)
    )
)]
pub async fn stop_job(State(state): State<AppState>) -> impl IntoResponse {
    let job_id = state.dispatcher.stop();
    Json(StopResponse {
        stopped: job_id.is_some(),
        job_id,
    })
}

/// POST /jobs/emergency-stop - Force the engine back to idle
#[utoipa::path(
    post,
    path = "/jobs/emergency-stop",
    tag = "jobs",
    responses(
        (status = 200, description = "Engine reset", body = StopResponse)
    )
)]
pub async fn emergency_stop(State(state): State<AppState>) -> impl IntoResponse {
    let job_id = state.dispatcher.emergency_stop().await;
    Json(StopResponse {
        stopped: job_id.is_some(),
        job_id,
    })
}
