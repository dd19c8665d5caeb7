use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

/// Client for the external email/SMS dispatch collaborator. Template
/// rendering happens on the collaborator side.
pub struct NotifyClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl NotifyClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self { http, base_url, api_key })
    }

    pub async fn send(
        &self,
        template_type: &str,
        recipient_email: &str,
        recipient_type: &str,
        recipient_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "template_type": template_type,
            "recipient_email": recipient_email,
            "recipient_type": recipient_type,
            "recipient_id": recipient_id,
            "data": data,
        });

        self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(NotifyError::Http)?
            .error_for_status()
            .map_err(NotifyError::Http)?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Http(#[from] reqwest::Error),
}
