use chrono::Utc;
use uuid::Uuid;

use super::HandlerError;
use crate::app_state::AppState;
use crate::db::{campaign_queries, participation_queries};
use crate::models::participation::ParticipationStatus;
use crate::services::fraud::{
    self, DuplicateAssetMatch, HistoryInput, VelocityInput,
};
use crate::services::phash;

/// Aggregate all abuse signals for a submission into one score and route the
/// participation accordingly.
///
/// Scheduled with a delay so the hash and similarity jobs usually finish
/// first; if an asset hash is still missing the handler fails and rides the
/// normal backoff ladder until the prerequisite lands or the job
/// dead-letters.
pub async fn run(state: &AppState, participation_id: Uuid) -> Result<(), HandlerError> {
    let participation = participation_queries::get_participation(&state.db, participation_id)
        .await?
        .ok_or(HandlerError::MissingRecord("participation"))?;

    if participation.status != ParticipationStatus::Submitted {
        // Redelivery after a crash, or a reviewer got there first.
        tracing::debug!(
            participation_id = %participation_id,
            status = %participation.status,
            "participation already routed, skipping fraud check"
        );
        return Ok(());
    }

    let assets = participation_queries::get_assets(&state.db, participation_id).await?;
    if assets.iter().any(|a| a.perceptual_hash.is_none()) {
        return Err(HandlerError::NotReady(
            "asset hashes not yet computed".to_string(),
        ));
    }

    let campaign = campaign_queries::get_campaign(&state.db, participation.campaign_id)
        .await?
        .ok_or(HandlerError::MissingRecord("campaign"))?;

    // Near-duplicate screenshots across the campaign.
    let other_hashes = participation_queries::campaign_asset_hashes(
        &state.db,
        participation.campaign_id,
        participation_id,
    )
    .await?;

    let mut matches = Vec::new();
    for asset in &assets {
        let Some(stored) = asset.perceptual_hash else { continue };
        let hash = phash::from_stored(stored);
        for (other_participation, other_stored) in &other_hashes {
            let distance = phash::hamming_distance(hash, phash::from_stored(*other_stored));
            if distance <= phash::NEAR_DUPLICATE_MAX_DISTANCE {
                matches.push(DuplicateAssetMatch {
                    asset_id: asset.id,
                    other_participation_id: *other_participation,
                    distance,
                });
            }
        }
    }

    let mut new_signals = Vec::new();
    if let Some(signal) = fraud::duplicate_image_signal(&matches) {
        new_signals.push(signal);
    }

    let submissions_today =
        campaign_queries::user_submissions_today(&state.db, participation.user_id).await?;
    if let Some(signal) = fraud::velocity_signal(VelocityInput {
        submissions_today,
        daily_cap: campaign.daily_participation_cap,
    }) {
        new_signals.push(signal);
    }

    let history =
        campaign_queries::user_history(&state.db, participation.user_id, participation_id).await?;
    let account_age_days = history
        .first_seen
        .map(|t| (Utc::now() - t).num_days())
        .unwrap_or(0);
    if let Some(signal) = fraud::history_signal(HistoryInput {
        account_age_days,
        prior_participations: history.total,
        prior_rejected: history.rejected,
    }) {
        new_signals.push(signal);
    }

    // Signals recorded by earlier pipeline stages (duplicate text).
    let existing = participation_queries::fraud_signals_for(&state.db, participation_id).await?;

    let contributions: Vec<i32> = existing
        .iter()
        .map(|s| s.score)
        .chain(new_signals.iter().map(|s| s.score))
        .collect();

    let score = fraud::aggregate_score(&contributions);
    let decision = fraud::decide(score, !contributions.is_empty());
    let target = fraud::decision_target(decision);

    let reasons: Vec<String> = existing
        .iter()
        .map(|s| format!("{}: {}", s.signal_type, s.signal_value))
        .chain(
            new_signals
                .iter()
                .map(|s| format!("{}: {}", s.signal_type, s.signal_value)),
        )
        .collect();

    let applied = participation_queries::apply_fraud_outcome(
        &state.db,
        participation_id,
        &new_signals,
        score,
        decision,
        target,
        &reasons,
    )
    .await?;

    if applied {
        metrics::counter!("fraud_decisions_total", "decision" => decision.to_string())
            .increment(1);
        tracing::info!(
            participation_id = %participation_id,
            score,
            decision = %decision,
            signals = contributions.len(),
            "fraud evaluation complete"
        );
    } else {
        tracing::warn!(
            participation_id = %participation_id,
            "fraud outcome discarded, participation moved concurrently"
        );
    }

    Ok(())
}
