use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::parse_enum;
use crate::models::campaign::Campaign;

fn campaign_from_row(row: &PgRow) -> Result<Campaign, sqlx::Error> {
    let status: String = row.try_get("status")?;

    Ok(Campaign {
        id: row.try_get("id")?,
        advertiser_id: row.try_get("advertiser_id")?,
        name: row.try_get("name")?,
        status: parse_enum(&status, "status")?,
        credit_cost_per_approval: row.try_get("credit_cost_per_approval")?,
        reward_amount: row.try_get("reward_amount")?,
        daily_participation_cap: row.try_get("daily_participation_cap")?,
        max_participants: row.try_get("max_participants")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn get_campaign(pool: &PgPool, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, advertiser_id, name, status, credit_cost_per_approval, reward_amount,
               daily_participation_cap, max_participants, created_at, updated_at
        FROM campaigns
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(campaign_from_row).transpose()
}

/// Total participations ever submitted against a campaign (capacity check).
pub async fn participation_count(pool: &PgPool, campaign_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM participations WHERE campaign_id = $1")
        .bind(campaign_id)
        .fetch_one(pool)
        .await?;

    row.try_get("count")
}

/// Participations submitted against a campaign since midnight UTC (daily cap).
pub async fn participation_count_today(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM participations
        WHERE campaign_id = $1 AND created_at >= date_trunc('day', NOW())
        "#,
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;

    row.try_get("count")
}

/// A user's submissions today across all campaigns (velocity signal input).
pub async fn user_submissions_today(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM participations
        WHERE user_id = $1 AND created_at >= date_trunc('day', NOW())
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    row.try_get("count")
}

/// A user's participation history, derived from the platform's own records:
/// first submission time, total prior participations, and how many of those
/// ended rejected.
pub struct UserHistory {
    pub first_seen: Option<DateTime<Utc>>,
    pub total: i64,
    pub rejected: i64,
}

pub async fn user_history(
    pool: &PgPool,
    user_id: Uuid,
    exclude_participation: Uuid,
) -> Result<UserHistory, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT MIN(created_at) AS first_seen,
               COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status IN ('auto_rejected', 'rejected')) AS rejected
        FROM participations
        WHERE user_id = $1 AND id <> $2
        "#,
    )
    .bind(user_id)
    .bind(exclude_participation)
    .fetch_one(pool)
    .await?;

    Ok(UserHistory {
        first_seen: row.try_get("first_seen")?,
        total: row.try_get("total")?,
        rejected: row.try_get("rejected")?,
    })
}
