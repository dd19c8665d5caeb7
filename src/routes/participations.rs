use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{campaign_queries, job_queries, participation_queries};
use crate::error::ApiError;
use crate::models::campaign::CampaignStatus;
use crate::models::job::{JobPayload, JobPriority, NewJob};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(skip)]
    pub user_id: Uuid,

    /// Structured answers to the campaign's questions.
    #[garde(skip)]
    #[serde(default = "empty_answers")]
    pub answers: serde_json::Value,

    #[garde(length(max = 5000))]
    #[serde(default)]
    pub feedback_text: String,

    /// Storage keys of already-uploaded proof screenshots.
    #[garde(length(min = 1, max = 10), inner(length(min = 1, max = 512)))]
    pub storage_keys: Vec<String>,
}

fn empty_answers() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub participation_id: Uuid,
    pub status: String,
    pub assets: usize,
}

/// POST /api/v1/campaigns/{campaign_id}/participations — submit proof of a
/// completed test. Creates the participation and its assets, then enqueues
/// the verification pipeline.
pub async fn submit(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    request.validate()?;

    let campaign = campaign_queries::get_campaign(&state.db, campaign_id)
        .await?
        .ok_or(ApiError::NotFound("campaign"))?;

    if campaign.status != CampaignStatus::Active {
        return Err(ApiError::CampaignClosed);
    }

    let total = campaign_queries::participation_count(&state.db, campaign_id).await?;
    if total >= campaign.max_participants as i64 {
        return Err(ApiError::CampaignFull);
    }

    let today = campaign_queries::participation_count_today(&state.db, campaign_id).await?;
    if today >= campaign.daily_participation_cap as i64 {
        return Err(ApiError::DailyLimitReached);
    }

    let (participation, assets) = participation_queries::create_participation(
        &state.db,
        campaign_id,
        request.user_id,
        request.answers,
        &request.feedback_text,
        &request.storage_keys,
    )
    .await
    .map_err(|e| {
        if participation_queries::is_duplicate_participation(&e) {
            ApiError::AlreadyParticipated
        } else {
            ApiError::Database(e)
        }
    })?;

    // The verification pipeline: a hash job per asset, one similarity job,
    // and the aggregation job delayed so its inputs are usually ready.
    let mut pipeline: Vec<NewJob> = assets
        .iter()
        .map(|asset| {
            NewJob::new(JobPayload::ImageHash {
                asset_id: asset.id,
                storage_key: asset.storage_key.clone(),
            })
            .with_priority(JobPriority::High)
        })
        .collect();

    pipeline.push(NewJob::new(JobPayload::TextSimilarity {
        participation_id: participation.id,
    }));

    pipeline.push(
        NewJob::new(JobPayload::FraudCheck {
            participation_id: participation.id,
        })
        .scheduled_at(Utc::now() + Duration::seconds(state.config.fraud_check_delay_secs)),
    );

    job_queries::enqueue_batch(&state.db, &pipeline).await?;

    metrics::counter!("participations_submitted_total").increment(1);
    tracing::info!(
        participation_id = %participation.id,
        campaign_id = %campaign_id,
        user_id = %request.user_id,
        assets = assets.len(),
        "participation submitted"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            participation_id: participation.id,
            status: participation.status.to_string(),
            assets: assets.len(),
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveRequest {
    #[garde(skip)]
    pub reviewer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub participation_id: Uuid,
    pub status: String,
    pub reward_id: Uuid,
    pub wallet_balance: i64,
}

/// POST /api/v1/participations/{id}/approve — one atomic operation: review
/// guard, wallet debit, ledger append, state transition, reward creation.
pub async fn approve(
    State(state): State<AppState>,
    Path(participation_id): Path<Uuid>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    request.validate()?;

    let outcome =
        participation_queries::approve(&state.db, participation_id, request.reviewer_id).await?;

    metrics::counter!("participations_approved_total").increment(1);
    tracing::info!(
        participation_id = %participation_id,
        reviewer_id = %request.reviewer_id,
        reward_id = %outcome.reward.id,
        wallet_balance = outcome.wallet_balance,
        "participation approved"
    );

    // Best-effort tester notification; the approval already committed.
    let notification = NewJob::new(JobPayload::SendEmail {
        template_type: "participation_approved".to_string(),
        recipient_email: String::new(),
        recipient_type: "tester".to_string(),
        recipient_id: outcome.participation.user_id,
        data: serde_json::json!({
            "participation_id": participation_id,
            "reward_amount": outcome.reward.amount,
        }),
    });
    if let Err(e) = job_queries::enqueue(&state.db, &notification).await {
        tracing::error!(
            participation_id = %participation_id,
            error = %e,
            "failed to enqueue approval notification"
        );
    }

    Ok(Json(ApproveResponse {
        participation_id: outcome.participation.id,
        status: outcome.participation.status.to_string(),
        reward_id: outcome.reward.id,
        wallet_balance: outcome.wallet_balance,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[garde(skip)]
    pub reviewer_id: Uuid,

    #[garde(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub participation_id: Uuid,
    pub status: String,
    pub reject_reason: Option<String>,
}

/// POST /api/v1/participations/{id}/reject — operator rejection. Touches no
/// money.
pub async fn reject(
    State(state): State<AppState>,
    Path(participation_id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<RejectResponse>, ApiError> {
    request.validate()?;

    let participation = participation_queries::reject(
        &state.db,
        participation_id,
        request.reviewer_id,
        &request.reason,
    )
    .await?;

    metrics::counter!("participations_rejected_total").increment(1);
    tracing::info!(
        participation_id = %participation_id,
        reviewer_id = %request.reviewer_id,
        reason = %request.reason,
        "participation rejected"
    );

    Ok(Json(RejectResponse {
        participation_id: participation.id,
        status: participation.status.to_string(),
        reject_reason: participation.reject_reason,
    }))
}
