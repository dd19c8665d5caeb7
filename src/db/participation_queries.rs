use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{parse_enum, wallet_queries};
use crate::models::fraud::{FraudDecision, FraudSignal, NewFraudSignal};
use crate::models::participation::{Asset, Participation, ParticipationStatus};
use crate::models::reward::{Reward, RewardStatus};
use crate::models::wallet::TransactionType;

const PARTICIPATION_COLUMNS: &str = "id, campaign_id, user_id, status, answers, feedback_text, \
     fraud_score, fraud_decision, fraud_reasons, reviewed_by, reviewed_at, reject_reason, \
     created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("participation not found")]
    NotFound,

    #[error("participation is in status '{current}'")]
    StatusConflict { current: String },

    #[error(transparent)]
    Ledger(#[from] wallet_queries::LedgerError),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn participation_from_row(row: &PgRow) -> Result<Participation, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let reasons: serde_json::Value = row.try_get("fraud_reasons")?;
    let fraud_reasons = serde_json::from_value(reasons)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Participation {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        user_id: row.try_get("user_id")?,
        status: parse_enum(&status, "status")?,
        answers: row.try_get("answers")?,
        feedback_text: row.try_get("feedback_text")?,
        fraud_score: row.try_get("fraud_score")?,
        fraud_decision: row.try_get("fraud_decision")?,
        fraud_reasons,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reject_reason: row.try_get("reject_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn asset_from_row(row: &PgRow) -> Result<Asset, sqlx::Error> {
    Ok(Asset {
        id: row.try_get("id")?,
        participation_id: row.try_get("participation_id")?,
        slot_index: row.try_get("slot_index")?,
        storage_key: row.try_get("storage_key")?,
        perceptual_hash: row.try_get("perceptual_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn signal_from_row(row: &PgRow) -> Result<FraudSignal, sqlx::Error> {
    let signal_type: String = row.try_get("signal_type")?;

    Ok(FraudSignal {
        id: row.try_get("id")?,
        participation_id: row.try_get("participation_id")?,
        signal_type: parse_enum(&signal_type, "signal_type")?,
        signal_value: row.try_get("signal_value")?,
        score: row.try_get("score")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
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

/// True when the database rejected an insert on the one-submission-per-
/// campaign-and-user constraint.
pub fn is_duplicate_participation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some("uq_participation_campaign_user")
    )
}

/// Create a participation and its assets in one transaction.
pub async fn create_participation(
    pool: &PgPool,
    campaign_id: Uuid,
    user_id: Uuid,
    answers: serde_json::Value,
    feedback_text: &str,
    storage_keys: &[String],
) -> Result<(Participation, Vec<Asset>), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO participations (campaign_id, user_id, answers, feedback_text)
        VALUES ($1, $2, $3, $4)
        RETURNING {PARTICIPATION_COLUMNS}
        "#
    ))
    .bind(campaign_id)
    .bind(user_id)
    .bind(answers)
    .bind(feedback_text)
    .fetch_one(&mut *tx)
    .await?;

    let participation = participation_from_row(&row)?;

    let mut assets = Vec::with_capacity(storage_keys.len());
    for (slot, key) in storage_keys.iter().enumerate() {
        let row = sqlx::query(
            r#"
            INSERT INTO assets (participation_id, slot_index, storage_key)
            VALUES ($1, $2, $3)
            RETURNING id, participation_id, slot_index, storage_key, perceptual_hash, created_at
            "#,
        )
        .bind(participation.id)
        .bind(slot as i32)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        assets.push(asset_from_row(&row)?);
    }

    tx.commit().await?;
    Ok((participation, assets))
}

pub async fn get_participation(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Participation>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PARTICIPATION_COLUMNS} FROM participations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(participation_from_row).transpose()
}

pub async fn get_asset(pool: &PgPool, asset_id: Uuid) -> Result<Option<Asset>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, participation_id, slot_index, storage_key, perceptual_hash, created_at
        FROM assets
        WHERE id = $1
        "#,
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(asset_from_row).transpose()
}

pub async fn get_assets(
    pool: &PgPool,
    participation_id: Uuid,
) -> Result<Vec<Asset>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, participation_id, slot_index, storage_key, perceptual_hash, created_at
        FROM assets
        WHERE participation_id = $1
        ORDER BY slot_index
        "#,
    )
    .bind(participation_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(asset_from_row).collect()
}

pub async fn set_asset_hash(
    pool: &PgPool,
    asset_id: Uuid,
    perceptual_hash: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE assets SET perceptual_hash = $2 WHERE id = $1")
        .bind(asset_id)
        .bind(perceptual_hash)
        .execute(pool)
        .await?;

    Ok(())
}

/// Hashes of other participations' assets in the same campaign, for
/// near-duplicate comparison. Bounded to the most recent entries.
pub async fn campaign_asset_hashes(
    pool: &PgPool,
    campaign_id: Uuid,
    exclude_participation: Uuid,
) -> Result<Vec<(Uuid, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT a.participation_id, a.perceptual_hash
        FROM assets a
        JOIN participations p ON p.id = a.participation_id
        WHERE p.campaign_id = $1
          AND a.participation_id <> $2
          AND a.perceptual_hash IS NOT NULL
        ORDER BY a.created_at DESC
        LIMIT 500
        "#,
    )
    .bind(campaign_id)
    .bind(exclude_participation)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok((
                row.try_get("participation_id")?,
                row.try_get("perceptual_hash")?,
            ))
        })
        .collect()
}

/// Other feedback texts to compare against: the whole campaign plus the most
/// recent submissions platform-wide.
pub async fn comparison_feedback_texts(
    pool: &PgPool,
    campaign_id: Uuid,
    exclude_participation: Uuid,
) -> Result<Vec<(Uuid, String)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        (SELECT id, feedback_text FROM participations
         WHERE campaign_id = $1 AND id <> $2 AND feedback_text <> '')
        UNION
        (SELECT id, feedback_text FROM participations
         WHERE id <> $2 AND feedback_text <> ''
         ORDER BY created_at DESC
         LIMIT 200)
        "#,
    )
    .bind(campaign_id)
    .bind(exclude_participation)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("id")?, row.try_get("feedback_text")?)))
        .collect()
}

/// Approved participations for a campaign, as report-generation input.
pub async fn approved_participations(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Vec<Participation>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {PARTICIPATION_COLUMNS}
        FROM participations
        WHERE campaign_id = $1 AND status IN ('approved', 'paid')
        ORDER BY created_at
        "#
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(participation_from_row).collect()
}

pub async fn insert_fraud_signal(
    pool: &PgPool,
    participation_id: Uuid,
    signal: &NewFraudSignal,
) -> Result<FraudSignal, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO fraud_signals (participation_id, signal_type, signal_value, score, details)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, participation_id, signal_type, signal_value, score, details, created_at
        "#,
    )
    .bind(participation_id)
    .bind(signal.signal_type.to_string())
    .bind(&signal.signal_value)
    .bind(signal.score)
    .bind(&signal.details)
    .fetch_one(pool)
    .await?;

    signal_from_row(&row)
}

pub async fn fraud_signals_for(
    pool: &PgPool,
    participation_id: Uuid,
) -> Result<Vec<FraudSignal>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, participation_id, signal_type, signal_value, score, details, created_at
        FROM fraud_signals
        WHERE participation_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(participation_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(signal_from_row).collect()
}

/// Write the aggregation outcome: new signal rows, then score + decision +
/// reasons in the same update that moves the state machine. The update is
/// guarded on status = 'submitted'; returns false when another writer got
/// there first (the signals are rolled back with it).
pub async fn apply_fraud_outcome(
    pool: &PgPool,
    participation_id: Uuid,
    new_signals: &[NewFraudSignal],
    score: i32,
    decision: FraudDecision,
    target: ParticipationStatus,
    reasons: &[String],
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for signal in new_signals {
        sqlx::query(
            r#"
            INSERT INTO fraud_signals (participation_id, signal_type, signal_value, score, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(participation_id)
        .bind(signal.signal_type.to_string())
        .bind(&signal.signal_value)
        .bind(signal.score)
        .bind(&signal.details)
        .execute(&mut *tx)
        .await?;
    }

    let reasons_json = serde_json::to_value(reasons)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let result = sqlx::query(
        r#"
        UPDATE participations
        SET status = $2, fraud_score = $3, fraud_decision = $4, fraud_reasons = $5,
            updated_at = NOW()
        WHERE id = $1 AND status = 'submitted'
        "#,
    )
    .bind(participation_id)
    .bind(target.to_string())
    .bind(score)
    .bind(decision.to_string())
    .bind(reasons_json)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 1 {
        tx.commit().await?;
        Ok(true)
    } else {
        tx.rollback().await?;
        Ok(false)
    }
}

/// Everything an approval produces, from one transaction.
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub participation: Participation,
    pub reward: Reward,
    pub wallet_balance: i64,
}

/// Approve a participation: one transaction spanning the review guard, the
/// wallet debit, the ledger append, the state transition, and the reward
/// creation. Any precondition failure rolls back every write.
pub async fn approve(
    pool: &PgPool,
    participation_id: Uuid,
    reviewer_id: Uuid,
) -> Result<ApprovalOutcome, ReviewError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        SELECT p.id, p.campaign_id, p.user_id, p.status, p.answers, p.feedback_text,
               p.fraud_score, p.fraud_decision, p.fraud_reasons, p.reviewed_by, p.reviewed_at,
               p.reject_reason, p.created_at, p.updated_at,
               c.advertiser_id, c.credit_cost_per_approval, c.reward_amount
        FROM participations p
        JOIN campaigns c ON c.id = p.campaign_id
        WHERE p.id = $1
        FOR UPDATE OF p
        "#,
    )
    .bind(participation_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ReviewError::NotFound)?;

    let participation = participation_from_row(&row)?;
    let advertiser_id: Uuid = row.try_get("advertiser_id").map_err(ReviewError::Db)?;
    let cost: i64 = row
        .try_get("credit_cost_per_approval")
        .map_err(ReviewError::Db)?;
    let reward_amount: i64 = row.try_get("reward_amount").map_err(ReviewError::Db)?;

    if !participation.status.reviewable() {
        return Err(ReviewError::StatusConflict {
            current: participation.status.to_string(),
        });
    }

    // Wallet debit and ledger append, inside the same transaction.
    let (wallet, _ledger_row) = wallet_queries::apply_operation(
        &mut tx,
        advertiser_id,
        TransactionType::Consume,
        -cost,
        Some("participation"),
        Some(participation_id),
        Some("participation approval"),
    )
    .await?;

    // Guarded transition: the status predicate must match what was checked
    // under the row lock.
    let row = sqlx::query(&format!(
        r#"
        UPDATE participations
        SET status = 'approved', reviewed_by = $2, reviewed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status IN ('submitted', 'pending_review', 'manual_review')
        RETURNING {PARTICIPATION_COLUMNS}
        "#
    ))
    .bind(participation_id)
    .bind(reviewer_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ReviewError::StatusConflict {
        current: participation.status.to_string(),
    })?;

    let approved = participation_from_row(&row)?;

    let row = sqlx::query(
        r#"
        INSERT INTO rewards (participation_id, user_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, participation_id, user_id, amount, status, method, proof, fail_reason,
                  created_at, updated_at
        "#,
    )
    .bind(participation_id)
    .bind(approved.user_id)
    .bind(reward_amount)
    .fetch_one(&mut *tx)
    .await?;

    let reward = reward_from_row(&row)?;
    debug_assert_eq!(reward.status, RewardStatus::Requested);

    tx.commit().await?;

    Ok(ApprovalOutcome {
        participation: approved,
        wallet_balance: wallet.balance,
        reward,
    })
}

/// Reject a participation with a reason. No ledger mutation.
pub async fn reject(
    pool: &PgPool,
    participation_id: Uuid,
    reviewer_id: Uuid,
    reason: &str,
) -> Result<Participation, ReviewError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE participations
        SET status = 'rejected', reviewed_by = $2, reviewed_at = NOW(),
            reject_reason = $3, updated_at = NOW()
        WHERE id = $1 AND status IN ('submitted', 'pending_review', 'manual_review')
        RETURNING {PARTICIPATION_COLUMNS}
        "#
    ))
    .bind(participation_id)
    .bind(reviewer_id)
    .bind(reason)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(participation_from_row(&row)?),
        None => {
            // Distinguish a missing row from a state-machine conflict.
            let current = get_participation(pool, participation_id)
                .await?
                .ok_or(ReviewError::NotFound)?;
            Err(ReviewError::StatusConflict {
                current: current.status.to_string(),
            })
        }
    }
}
