use axum::extract::State;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct UploadSlotResponse {
    pub storage_key: String,
    pub upload_url: String,
}

/// POST /api/v1/uploads — allocate a storage key and a pre-signed URL the
/// client PUTs the screenshot to. The key is what a later submission refers
/// to; the server never proxies the bytes.
pub async fn create_upload_slot(
    State(state): State<AppState>,
) -> Result<Json<UploadSlotResponse>, ApiError> {
    let storage_key = format!("assets/{}", Uuid::new_v4());

    let upload_url = state
        .storage
        .signed_upload_url(&storage_key)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    Ok(Json(UploadSlotResponse { storage_key, upload_url }))
}
