use apptrial::{
    app_state::AppState,
    config::AppConfig,
    db, jobs,
    services::{
        notify::NotifyClient, payments::PaymentClient, reports::ReportClient,
        storage::StorageClient,
    },
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

/// Standalone dispatcher: runs bounded batches on an interval. Deployments
/// that prefer an HTTP cron trigger can hit /internal/jobs/run instead; the
/// claim path makes it safe to run both at once.
#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting apptrial dispatcher");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize collaborator clients
    tracing::info!("Initializing services");
    let storage = StorageClient::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
    )
    .expect("Failed to initialize storage client");

    let payments = PaymentClient::new(config.payment_api_url.clone(), config.payment_api_key.clone())
        .expect("Failed to initialize payment client");

    let notify = NotifyClient::new(config.notify_api_url.clone(), config.notify_api_key.clone())
        .expect("Failed to initialize notification client");

    let reports = ReportClient::new(config.report_api_url.clone(), config.report_api_key.clone())
        .expect("Failed to initialize report client");

    let batch_limit = config.job_batch_limit;
    let state = AppState::new(db_pool, config, storage, payments, notify, reports);

    tracing::info!("Dispatcher ready, starting batch loop");

    loop {
        match jobs::run_batch(&state, batch_limit).await {
            Ok(outcome) if outcome.processed > 0 || outcome.failed > 0 => {
                tracing::info!(
                    processed = outcome.processed,
                    failed = outcome.failed,
                    "dispatch batch complete"
                );
            }
            Ok(_) => {
                tracing::trace!("no due jobs, sleeping");
            }
            Err(e) => {
                tracing::error!(error = %e, "dispatch batch failed, will retry");
            }
        }
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}
