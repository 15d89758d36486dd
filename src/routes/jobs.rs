use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{
    AckResponse, CompleteRequest, EnqueueRequest, EnqueueResponse, FailRequest, JobResponse,
    LeaseRequest, LeaseResponse,
};
use crate::models::job::{JobId, DEFAULT_PRIORITY};
use crate::routes::errors::ApiError;

/// POST /jobs: enqueue a job.
pub async fn enqueue_job(
    State(state): State<AppState>,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let Json(req) = body?;
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let job = state
        .queue
        .enqueue(req.job_type, req.payload, req.priority.unwrap_or(DEFAULT_PRIORITY))
        .await;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { success: true, job })))
}

/// POST /jobs/next: lease the next eligible job.
pub async fn lease_job(
    State(state): State<AppState>,
    body: Result<Option<Json<LeaseRequest>>, JsonRejection>,
) -> Result<Json<LeaseResponse>, ApiError> {
    let types = body?
        .and_then(|Json(req)| req.types)
        .unwrap_or_default();
    let job = state.queue.lease(&types).await;
    Ok(Json(LeaseResponse { ok: true, job }))
}

/// POST /jobs/:id/complete
pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    body: Result<Option<Json<CompleteRequest>>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let result = body?.map(|Json(req)| req.result).unwrap_or_default();
    state.queue.complete(id, result).await;
    Ok(Json(AckResponse { success: true }))
}

/// POST /jobs/:id/fail
pub async fn fail_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    body: Result<Json<FailRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(req) = body?;
    state
        .queue
        .fail(id, &req.error, req.requeue, req.delay_ms)
        .await;
    Ok(Json(AckResponse { success: true }))
}

/// GET /jobs/:id: job status.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.queue.get(id).await.ok_or(ApiError::NotFound(id))?;
    Ok(Json(JobResponse { success: true, job }))
}
