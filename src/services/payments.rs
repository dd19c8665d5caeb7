use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Outcome of verifying a payment reference with the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentVerification {
    pub paid: bool,
    pub amount: i64,
    pub store_id: String,
}

/// Client for the external payment-verification collaborator.
pub struct PaymentClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PaymentClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(PaymentError::Http)?;
        Ok(Self { http, base_url, api_key })
    }

    /// Look up a payment reference and return its settlement state.
    pub async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let url = format!("{}/v1/payments/{}", self.base_url, reference);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(PaymentError::Http)?
            .error_for_status()
            .map_err(PaymentError::Http)?;

        response.json().await.map_err(PaymentError::Http)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
}
