use uuid::Uuid;

use super::HandlerError;
use crate::app_state::AppState;
use crate::db::participation_queries;
use crate::services::reports::ParticipationSummary;

/// Hand a campaign's approved participations to the narrative-report
/// collaborator. Report content and persistence live on the collaborator
/// side.
pub async fn run(state: &AppState, campaign_id: Uuid) -> Result<(), HandlerError> {
    let approved =
        participation_queries::approved_participations(&state.db, campaign_id).await?;

    if approved.is_empty() {
        tracing::info!(campaign_id = %campaign_id, "no approved participations, skipping report");
        return Ok(());
    }

    let summaries: Vec<ParticipationSummary> = approved
        .into_iter()
        .map(|p| ParticipationSummary {
            participation_id: p.id,
            answers: p.answers,
            feedback_text: p.feedback_text,
        })
        .collect();

    let report = state.reports.generate(campaign_id, &summaries).await?;

    tracing::info!(
        campaign_id = %campaign_id,
        participations = summaries.len(),
        report_keys = report.as_object().map(|o| o.len()).unwrap_or(0),
        "campaign report generated"
    );

    Ok(())
}
