use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for the dispatch binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Shared secret for the internal dispatch/retry endpoints
    pub dispatch_token: String,

    /// S3-compatible bucket holding submitted assets
    pub storage_bucket: String,

    /// S3 endpoint URL
    pub storage_endpoint: String,

    /// S3 access key ID
    pub storage_access_key: String,

    /// S3 secret access key
    pub storage_secret_key: String,

    /// Payment-verification collaborator base URL
    pub payment_api_url: String,

    /// Payment-verification API key
    pub payment_api_key: String,

    /// Notification-dispatch collaborator base URL
    pub notify_api_url: String,

    /// Notification-dispatch API key
    pub notify_api_key: String,

    /// AI report collaborator base URL
    pub report_api_url: String,

    /// AI report API key
    pub report_api_key: String,

    /// Jobs claimed per dispatcher batch when the trigger omits a limit
    #[serde(default = "default_batch_limit")]
    pub job_batch_limit: i64,

    /// Base delay for exponential retry backoff, in seconds
    #[serde(default = "default_backoff_secs")]
    pub job_backoff_base_secs: i64,

    /// Delay before the fraud-check job runs, giving hash/similarity jobs
    /// time to land first
    #[serde(default = "default_fraud_delay_secs")]
    pub fraud_check_delay_secs: i64,

    /// Whether an operator retry of a failed/dead job also resets its
    /// attempt counter
    #[serde(default)]
    pub reset_attempts_on_retry: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_batch_limit() -> i64 {
    25
}

fn default_backoff_secs() -> i64 {
    30
}

fn default_fraud_delay_secs() -> i64 {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
