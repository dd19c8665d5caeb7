use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::job_queries;
use crate::error::ApiError;
use crate::jobs::{self, BatchOutcome};

/// Require the configured shared secret as a bearer token. The dispatch
/// endpoints are internal: cron triggers and operator tooling only.
fn require_dispatch_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if token != state.config.dispatch_token {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct RunJobsRequest {
    pub limit: Option<i64>,
}

/// POST /internal/jobs/run — execute one bounded dispatch batch.
///
/// Invoked by an external scheduler; concurrent invocations are safe because
/// each job is claimed with a conditional update before execution.
pub async fn run_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RunJobsRequest>>,
) -> Result<Json<BatchOutcome>, ApiError> {
    require_dispatch_token(&state, &headers)?;

    let limit = body
        .and_then(|Json(req)| req.limit)
        .unwrap_or(state.config.job_batch_limit)
        .clamp(1, 500);

    let outcome = jobs::run_batch(&state, limit).await?;

    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct RetryJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub attempts: i32,
}

/// POST /internal/jobs/{job_id}/retry — operator reset of a failed/dead job
/// back to pending. Clears error state; attempt-counter behavior follows the
/// reset_attempts_on_retry setting.
pub async fn retry_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<RetryJobResponse>, ApiError> {
    require_dispatch_token(&state, &headers)?;

    // Guard first so the caller can tell "missing" from "not resettable".
    let job = job_queries::get_job(&state.db, job_id)
        .await?
        .ok_or(ApiError::NotFound("job"))?;

    if !job_queries::is_resettable(job.status) {
        return Err(ApiError::StatusConflict {
            current: job.status.to_string(),
        });
    }

    let reset = job_queries::reset_for_retry(&state.db, job_id, state.config.reset_attempts_on_retry)
        .await?
        .ok_or(ApiError::StatusConflict {
            // The job moved between the read and the guarded update.
            current: "changed concurrently".to_string(),
        })?;

    tracing::info!(
        job_id = %job_id,
        job_type = %reset.job_type,
        attempts = reset.attempts,
        reset_attempts = state.config.reset_attempts_on_retry,
        "operator reset job for retry"
    );

    Ok(Json(RetryJobResponse {
        job_id: reset.id,
        status: reset.status.to_string(),
        attempts: reset.attempts,
    }))
}
