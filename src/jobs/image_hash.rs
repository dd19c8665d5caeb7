use uuid::Uuid;

use super::HandlerError;
use crate::app_state::AppState;
use crate::db::participation_queries;
use crate::services::phash;

/// Compute and persist the perceptual hash of one submitted asset.
///
/// Idempotent: a redelivered job for an already-hashed asset completes
/// without touching storage.
pub async fn run(state: &AppState, asset_id: Uuid, storage_key: &str) -> Result<(), HandlerError> {
    let asset = participation_queries::get_asset(&state.db, asset_id)
        .await?
        .ok_or(HandlerError::MissingRecord("asset"))?;

    if asset.perceptual_hash.is_some() {
        tracing::debug!(asset_id = %asset_id, "asset already hashed, skipping");
        return Ok(());
    }

    let bytes = state.storage.download(storage_key).await?;
    let hash = phash::difference_hash(&bytes)?;

    participation_queries::set_asset_hash(&state.db, asset_id, phash::to_stored(hash)).await?;

    tracing::info!(
        asset_id = %asset_id,
        participation_id = %asset.participation_id,
        hash = %format!("{hash:016x}"),
        "perceptual hash stored"
    );

    Ok(())
}
