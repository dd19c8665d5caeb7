use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::reward_queries;
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct MarkSentRequest {
    /// How the payout was made (bank transfer, gift card, ...).
    #[garde(length(min = 1, max = 100))]
    pub method: String,

    /// Proof-of-send reference for the audit trail.
    #[garde(length(min = 1, max = 500))]
    pub proof: String,
}

#[derive(Debug, Serialize)]
pub struct RewardResponse {
    pub reward_id: Uuid,
    pub participation_id: Uuid,
    pub status: String,
}

/// POST /api/v1/rewards/{id}/sent — record a completed payout. Also moves
/// the owning participation to paid.
pub async fn mark_sent(
    State(state): State<AppState>,
    Path(reward_id): Path<Uuid>,
    Json(request): Json<MarkSentRequest>,
) -> Result<Json<RewardResponse>, ApiError> {
    request.validate()?;

    let reward =
        reward_queries::mark_sent(&state.db, reward_id, &request.method, &request.proof).await?;

    metrics::counter!("rewards_sent_total").increment(1);
    tracing::info!(
        reward_id = %reward_id,
        participation_id = %reward.participation_id,
        amount = reward.amount,
        method = %request.method,
        "reward sent"
    );

    Ok(Json(RewardResponse {
        reward_id: reward.id,
        participation_id: reward.participation_id,
        status: reward.status.to_string(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkFailedRequest {
    #[garde(length(min = 1, max = 500))]
    pub reason: String,
}

/// POST /api/v1/rewards/{id}/failed — record a payout attempt that could not
/// be completed. The participation stays approved.
pub async fn mark_failed(
    State(state): State<AppState>,
    Path(reward_id): Path<Uuid>,
    Json(request): Json<MarkFailedRequest>,
) -> Result<Json<RewardResponse>, ApiError> {
    request.validate()?;

    let reward = reward_queries::mark_failed(&state.db, reward_id, &request.reason).await?;

    metrics::counter!("rewards_failed_total").increment(1);
    tracing::warn!(
        reward_id = %reward_id,
        participation_id = %reward.participation_id,
        reason = %request.reason,
        "reward payout failed"
    );

    Ok(Json(RewardResponse {
        reward_id: reward.id,
        participation_id: reward.participation_id,
        status: reward.status.to_string(),
    }))
}
