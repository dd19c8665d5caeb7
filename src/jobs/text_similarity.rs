use uuid::Uuid;

use super::HandlerError;
use crate::app_state::AppState;
use crate::db::participation_queries;
use crate::models::fraud::{NewFraudSignal, SignalType};
use crate::services::fraud::WEIGHT_DUPLICATE_TEXT;
use crate::services::similarity;

/// Compare a participation's feedback against other submissions in the same
/// campaign and recent submissions platform-wide; record a copy/paste signal
/// when one clears the similarity threshold.
///
/// Idempotent: if a duplicate-text signal already exists for this
/// participation, a redelivery records nothing new.
pub async fn run(state: &AppState, participation_id: Uuid) -> Result<(), HandlerError> {
    let participation = participation_queries::get_participation(&state.db, participation_id)
        .await?
        .ok_or(HandlerError::MissingRecord("participation"))?;

    let existing = participation_queries::fraud_signals_for(&state.db, participation_id).await?;
    if existing
        .iter()
        .any(|s| s.signal_type == SignalType::DuplicateText)
    {
        tracing::debug!(participation_id = %participation_id, "duplicate-text signal already recorded");
        return Ok(());
    }

    let corpus = participation_queries::comparison_feedback_texts(
        &state.db,
        participation.campaign_id,
        participation_id,
    )
    .await?;

    let best = similarity::best_match(
        &participation.feedback_text,
        corpus.iter().map(|(id, text)| (*id, text.as_str())),
    );

    if let Some((score, matched_id)) = best {
        let signal = NewFraudSignal {
            signal_type: SignalType::DuplicateText,
            signal_value: format!("{score:.3}"),
            score: WEIGHT_DUPLICATE_TEXT,
            details: serde_json::json!({
                "matched_participation_id": matched_id,
                "similarity": score,
            }),
        };
        participation_queries::insert_fraud_signal(&state.db, participation_id, &signal).await?;

        tracing::info!(
            participation_id = %participation_id,
            matched_participation_id = %matched_id,
            similarity = score,
            "copy/paste feedback flagged"
        );
    }

    Ok(())
}
