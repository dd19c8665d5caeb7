use axum::extract::State;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::wallet_queries;
use crate::error::ApiError;

#[derive(Debug, Deserialize, Validate)]
pub struct TopupRequest {
    #[garde(skip)]
    pub advertiser_id: Uuid,

    /// Gateway reference for the payment being confirmed.
    #[garde(length(min = 1, max = 128))]
    pub payment_reference: String,
}

#[derive(Debug, Serialize)]
pub struct TopupResponse {
    pub wallet_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: i64,
    pub balance: i64,
}

/// POST /api/v1/wallets/topup — confirm an advertiser payment and credit the
/// wallet. The credited amount is whatever the gateway settled, not whatever
/// the caller claims.
pub async fn topup(
    State(state): State<AppState>,
    Json(request): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, ApiError> {
    request.validate()?;

    let verification = state
        .payments
        .verify(&request.payment_reference)
        .await
        .map_err(|e| ApiError::PaymentNotConfirmed(e.to_string()))?;

    if !verification.paid {
        return Err(ApiError::PaymentNotConfirmed(format!(
            "payment {} is not settled",
            request.payment_reference
        )));
    }

    wallet_queries::get_or_create_wallet(&state.db, request.advertiser_id).await?;

    let (wallet, transaction) = wallet_queries::topup(
        &state.db,
        request.advertiser_id,
        verification.amount,
        &request.payment_reference,
    )
    .await?;

    metrics::counter!("wallet_topups_total").increment(1);
    tracing::info!(
        wallet_id = %wallet.id,
        advertiser_id = %request.advertiser_id,
        amount = verification.amount,
        store_id = %verification.store_id,
        balance = wallet.balance,
        "wallet topped up"
    );

    Ok(Json(TopupResponse {
        wallet_id: wallet.id,
        transaction_id: transaction.id,
        amount: transaction.amount,
        balance: wallet.balance,
    }))
}
