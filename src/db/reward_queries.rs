use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::parse_enum;
use crate::models::reward::{Reward, RewardStatus};

#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    #[error("reward not found")]
    NotFound,

    #[error("reward is in status '{current}'")]
    StatusConflict { current: String },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn reward_from_row(row: &PgRow) -> Result<Reward, sqlx::Error> {
    let status: String = row.try_get("status")?;

    Ok(Reward {
        id: row.try_get("id")?,
        participation_id: row.try_get("participation_id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        status: parse_enum(&status, "status")?,
        method: row.try_get("method")?,
        proof: row.try_get("proof")?,
        fail_reason: row.try_get("fail_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn get_reward(pool: &PgPool, reward_id: Uuid) -> Result<Option<Reward>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, participation_id, user_id, amount, status, method, proof, fail_reason,
               created_at, updated_at
        FROM rewards
        WHERE id = $1
        "#,
    )
    .bind(reward_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(reward_from_row).transpose()
}

/// Record a completed payout. Flips the reward to sent and the owning
/// participation to paid in one transaction; only a requested reward may
/// leave that state, and only once.
pub async fn mark_sent(
    pool: &PgPool,
    reward_id: Uuid,
    method: &str,
    proof: &str,
) -> Result<Reward, RewardError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        UPDATE rewards
        SET status = 'sent', method = $2, proof = $3, updated_at = NOW()
        WHERE id = $1 AND status = 'requested'
        RETURNING id, participation_id, user_id, amount, status, method, proof, fail_reason,
                  created_at, updated_at
        "#,
    )
    .bind(reward_id)
    .bind(method)
    .bind(proof)
    .fetch_optional(&mut *tx)
    .await?;

    let reward = match row {
        Some(row) => reward_from_row(&row)?,
        None => {
            tx.rollback().await?;
            let current = get_reward(pool, reward_id)
                .await?
                .ok_or(RewardError::NotFound)?;
            return Err(RewardError::StatusConflict {
                current: current.status.to_string(),
            });
        }
    };

    // A reward in requested state implies an approved participation.
    let result = sqlx::query(
        r#"
        UPDATE participations
        SET status = 'paid', updated_at = NOW()
        WHERE id = $1 AND status = 'approved'
        "#,
    )
    .bind(reward.participation_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != 1 {
        tx.rollback().await?;
        return Err(RewardError::StatusConflict {
            current: "participation not approved".to_string(),
        });
    }

    tx.commit().await?;

    debug_assert_eq!(reward.status, RewardStatus::Sent);
    Ok(reward)
}

/// Record a failed payout attempt with its reason. Terminal for the reward;
/// the participation stays approved.
pub async fn mark_failed(
    pool: &PgPool,
    reward_id: Uuid,
    fail_reason: &str,
) -> Result<Reward, RewardError> {
    let row = sqlx::query(
        r#"
        UPDATE rewards
        SET status = 'failed', fail_reason = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'requested'
        RETURNING id, participation_id, user_id, amount, status, method, proof, fail_reason,
                  created_at, updated_at
        "#,
    )
    .bind(reward_id)
    .bind(fail_reason)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(reward_from_row(&row)?),
        None => {
            let current = get_reward(pool, reward_id)
                .await?
                .ok_or(RewardError::NotFound)?;
            Err(RewardError::StatusConflict {
                current: current.status.to_string(),
            })
        }
    }
}
