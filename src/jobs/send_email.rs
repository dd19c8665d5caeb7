use uuid::Uuid;

use super::HandlerError;
use crate::app_state::AppState;

/// Forward a notification to the email/SMS dispatch collaborator, which owns
/// template rendering and recipient resolution.
pub async fn run(
    state: &AppState,
    template_type: &str,
    recipient_email: &str,
    recipient_type: &str,
    recipient_id: Uuid,
    data: &serde_json::Value,
) -> Result<(), HandlerError> {
    state
        .notify
        .send(template_type, recipient_email, recipient_type, recipient_id, data)
        .await?;

    tracing::info!(
        template_type,
        recipient_type,
        recipient_id = %recipient_id,
        "notification dispatched"
    );

    Ok(())
}
