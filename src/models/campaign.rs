use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Closed,
}

/// An advertiser's test campaign. Campaign management itself is out of scope;
/// the core reads campaigns to validate submissions and price approvals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    /// Credits debited from the advertiser wallet per approved participation.
    pub credit_cost_per_approval: i64,
    /// Payout obligation created for the tester on approval.
    pub reward_amount: i64,
    pub daily_participation_cap: i32,
    pub max_participants: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
