use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::app_state::AppState;
use crate::db::job_queries;
use crate::models::job::{Job, JobPayload};
use crate::services::phash::PhashError;
use crate::services::{notify::NotifyError, reports::ReportError, storage::StorageError};

pub mod ai_report;
pub mod fraud_check;
pub mod image_hash;
pub mod send_email;
pub mod text_similarity;

/// Failure of a single job execution. The dispatcher does not distinguish
/// transient from permanent causes; max_attempts is the ceiling either way.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("payload decode failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0} no longer exists")]
    MissingRecord(&'static str),

    #[error("prerequisite not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Phash(#[from] PhashError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Summary of one dispatcher invocation.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub processed: u64,
    pub failed: u64,
    /// Job counts per status across the whole store, after the batch.
    pub stats: HashMap<String, i64>,
}

/// Exponential retry delay: base × 2^attempts, with the exponent capped so
/// the arithmetic cannot overflow.
pub fn backoff_delay(base_secs: i64, attempts: i32) -> Duration {
    let exp = attempts.clamp(0, 16) as u32;
    Duration::seconds(base_secs.saturating_mul(1i64 << exp))
}

/// Run one bounded dispatch batch: select due jobs, claim each with a
/// conditional update, execute, and apply retry/dead-letter bookkeeping.
///
/// Safe to invoke concurrently: a job lost to another invocation's claim is
/// skipped, not re-executed.
pub async fn run_batch(state: &AppState, limit: i64) -> Result<BatchOutcome, sqlx::Error> {
    let due = job_queries::fetch_due(&state.db, limit).await?;
    let mut processed = 0u64;
    let mut failed = 0u64;

    for job in due {
        if !job_queries::claim(&state.db, job.id).await? {
            // Another invocation won this job.
            continue;
        }

        let start = Instant::now();
        match execute(state, &job).await {
            Ok(()) => {
                job_queries::mark_completed(&state.db, job.id).await?;
                processed += 1;
                metrics::counter!("jobs_processed_total").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "job completed"
                );
            }
            Err(e) => {
                failed += 1;
                metrics::counter!("jobs_failed_total").increment(1);

                // Capped so an operator reset that kept a maxed-out counter
                // cannot push attempts past max_attempts.
                let attempts = (job.attempts + 1).min(job.max_attempts);
                if attempts < job.max_attempts {
                    let retry_at =
                        Utc::now() + backoff_delay(state.config.job_backoff_base_secs, attempts);
                    job_queries::mark_retry(&state.db, job.id, attempts, retry_at, &e.to_string())
                        .await?;
                    tracing::warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts,
                        retry_at = %retry_at,
                        error = %e,
                        "job failed, retry scheduled"
                    );
                } else {
                    job_queries::mark_dead(&state.db, job.id, attempts, &e.to_string()).await?;
                    metrics::counter!("jobs_dead_lettered_total").increment(1);
                    tracing::error!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts,
                        error = %e,
                        "job dead-lettered"
                    );
                }
            }
        }
        metrics::histogram!("job_execution_seconds").record(start.elapsed().as_secs_f64());
    }

    let stats = job_queries::status_counts(&state.db).await?;
    Ok(BatchOutcome { processed, failed, stats })
}

async fn execute(state: &AppState, job: &Job) -> Result<(), HandlerError> {
    match job.decode_payload()? {
        JobPayload::ImageHash { asset_id, storage_key } => {
            image_hash::run(state, asset_id, &storage_key).await
        }
        JobPayload::TextSimilarity { participation_id } => {
            text_similarity::run(state, participation_id).await
        }
        JobPayload::FraudCheck { participation_id } => {
            fraud_check::run(state, participation_id).await
        }
        JobPayload::AiReport { campaign_id } => ai_report::run(state, campaign_id).await,
        JobPayload::SendEmail {
            template_type,
            recipient_email,
            recipient_type,
            recipient_id,
            data,
        } => {
            send_email::run(
                state,
                &template_type,
                &recipient_email,
                &recipient_type,
                recipient_id,
                &data,
            )
            .await
        }
    }
}
