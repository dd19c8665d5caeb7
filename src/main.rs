mod app_state;
mod config;
mod db;
mod error;
mod jobs;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    notify::NotifyClient, payments::PaymentClient, reports::ReportClient, storage::StorageClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing apptrial server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "participations_submitted_total",
        "Total participations submitted"
    );
    metrics::describe_counter!(
        "participations_approved_total",
        "Total participations approved"
    );
    metrics::describe_counter!(
        "participations_rejected_total",
        "Total participations rejected by an operator"
    );
    metrics::describe_counter!(
        "fraud_decisions_total",
        "Fraud pipeline decisions, labeled by outcome"
    );
    metrics::describe_counter!("jobs_processed_total", "Jobs completed successfully");
    metrics::describe_counter!("jobs_failed_total", "Job executions that failed");
    metrics::describe_counter!(
        "jobs_dead_lettered_total",
        "Jobs parked after exhausting their retry budget"
    );
    metrics::describe_histogram!("job_execution_seconds", "Time to execute one job");
    metrics::describe_counter!("wallet_topups_total", "Confirmed wallet top-ups");
    metrics::describe_counter!("rewards_sent_total", "Rewards marked sent");
    metrics::describe_counter!("rewards_failed_total", "Reward payouts marked failed");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize collaborator clients
    tracing::info!("Initializing storage client");
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

    let bind_addr = config.bind_addr.clone();

    // Create shared application state
    let state = AppState::new(db_pool, config, storage, payments, notify, reports);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/uploads", post(routes::uploads::create_upload_slot))
        .route(
            "/api/v1/campaigns/{campaign_id}/participations",
            post(routes::participations::submit),
        )
        .route(
            "/api/v1/participations/{participation_id}/approve",
            post(routes::participations::approve),
        )
        .route(
            "/api/v1/participations/{participation_id}/reject",
            post(routes::participations::reject),
        )
        .route("/api/v1/wallets/topup", post(routes::wallets::topup))
        .route("/api/v1/rewards/{reward_id}/sent", post(routes::rewards::mark_sent))
        .route(
            "/api/v1/rewards/{reward_id}/failed",
            post(routes::rewards::mark_failed),
        )
        .route("/internal/jobs/run", post(routes::jobs::run_jobs))
        .route("/internal/jobs/{job_id}/retry", post(routes::jobs::retry_job))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::health::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB: JSON only, uploads go to storage

    tracing::info!("Starting apptrial on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
