use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use super::parse_enum;
use crate::models::job::{Job, JobStatus, NewJob};

const JOB_COLUMNS: &str = "id, job_type, payload, status, priority, attempts, max_attempts, \
     scheduled_at, error_message, started_at, completed_at, failed_at, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;

    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        status: parse_enum(&status, "status")?,
        priority: parse_enum(&priority, "priority")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        scheduled_at: row.try_get("scheduled_at")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        failed_at: row.try_get("failed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Persist a new job in pending state, scheduled now unless deferred.
pub async fn enqueue(pool: &PgPool, job: &NewJob) -> Result<Job, sqlx::Error> {
    let payload = serde_json::to_value(&job.payload)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (job_type, payload, priority, max_attempts, scheduled_at)
        VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.payload.job_type())
    .bind(payload)
    .bind(job.priority.to_string())
    .bind(job.max_attempts)
    .bind(job.scheduled_at)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Enqueue a set of jobs atomically: either all land in pending or none do.
pub async fn enqueue_batch(pool: &PgPool, jobs: &[NewJob]) -> Result<Vec<Job>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(jobs.len());

    for job in jobs {
        let payload = serde_json::to_value(&job.payload)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (job_type, payload, priority, max_attempts, scheduled_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.payload.job_type())
        .bind(payload)
        .bind(job.priority.to_string())
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .fetch_one(&mut *tx)
        .await?;

        created.push(job_from_row(&row)?);
    }

    tx.commit().await?;
    Ok(created)
}

/// Select up to `limit` due pending jobs: high priority before medium before
/// low, then oldest schedule time, then enqueue order.
pub async fn fetch_due(pool: &PgPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE status = 'pending' AND scheduled_at <= NOW()
        ORDER BY
            CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
            scheduled_at ASC,
            created_at ASC
        LIMIT $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Claim a job for execution. The conditional update is the atomicity
/// boundary: of two overlapping dispatcher invocations, only the one whose
/// update affects a row may execute the job.
pub async fn claim(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'processing', started_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_completed(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed', completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed attempt and put the job back in pending, rescheduled at
/// the given backoff time.
pub async fn mark_retry(
    pool: &PgPool,
    job_id: Uuid,
    attempts: i32,
    retry_at: DateTime<Utc>,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'pending', attempts = $2, scheduled_at = $3,
            error_message = $4, started_at = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(attempts)
    .bind(retry_at)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Park a job that exhausted its retry budget. The error message is retained
/// for operator inspection.
pub async fn mark_dead(
    pool: &PgPool,
    job_id: Uuid,
    attempts: i32,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'dead', attempts = $2, error_message = $3,
            failed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(attempts)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Operator reset of a failed/dead job back into the normal retry path.
/// Clears error state; optionally also resets the attempt counter. Returns
/// None when the job does not exist or is not in a resettable status.
pub async fn reset_for_retry(
    pool: &PgPool,
    job_id: Uuid,
    reset_attempts: bool,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'pending',
            attempts = CASE WHEN $2 THEN 0 ELSE attempts END,
            error_message = NULL, failed_at = NULL,
            scheduled_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status IN ('failed', 'dead')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(reset_attempts)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Per-status job counts for dispatch run summaries.
pub async fn status_counts(pool: &PgPool) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut counts = HashMap::new();
    for row in rows {
        let status: String = row.try_get("status")?;
        let count: i64 = row.try_get("count")?;
        counts.insert(status, count);
    }
    Ok(counts)
}

/// Dead/failed job guard for the operator retry endpoint.
pub fn is_resettable(status: JobStatus) -> bool {
    matches!(status, JobStatus::Failed | JobStatus::Dead)
}
