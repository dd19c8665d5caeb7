use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// One approved participation, as handed to the report generator.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipationSummary {
    pub participation_id: Uuid,
    pub answers: serde_json::Value,
    pub feedback_text: String,
}

/// Client for the external AI narrative-report collaborator.
pub struct ReportClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ReportClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, ReportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ReportError::Http)?;
        Ok(Self { http, base_url, api_key })
    }

    /// Submit a campaign's approved participations and return the structured
    /// summary produced by the collaborator.
    pub async fn generate(
        &self,
        campaign_id: Uuid,
        participations: &[ParticipationSummary],
    ) -> Result<serde_json::Value, ReportError> {
        let url = format!("{}/v1/reports", self.base_url);

        let body = serde_json::json!({
            "campaign_id": campaign_id,
            "participations": participations,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ReportError::Http)?
            .error_for_status()
            .map_err(ReportError::Http)?;

        response.json().await.map_err(ReportError::Http)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report generation failed: {0}")]
    Http(#[from] reqwest::Error),
}
