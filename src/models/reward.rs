use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Payout lifecycle. A reward leaves `Requested` exactly once, by an explicit
/// operator action carrying proof-of-send or a failure reason.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RewardStatus {
    Requested,
    Sent,
    Failed,
}

/// The monetary obligation to a tester created by an approval. Tracked
/// separately from the ledger debit that funds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub participation_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: RewardStatus,
    pub method: Option<String>,
    pub proof: Option<String>,
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
