use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of one tester's submission against one campaign.
///
/// ```text
/// submitted ──(fraud pipeline)──> pending_review | manual_review | auto_rejected
/// submitted | pending_review | manual_review ──(operator)──> approved | rejected
/// approved ──(reward sent)──> paid
/// ```
///
/// auto_rejected, rejected, and paid are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipationStatus {
    Submitted,
    PendingReview,
    ManualReview,
    AutoRejected,
    Approved,
    Rejected,
    Paid,
}

impl ParticipationStatus {
    /// States from which an operator may approve or reject.
    pub fn reviewable(self) -> bool {
        matches!(
            self,
            ParticipationStatus::Submitted
                | ParticipationStatus::PendingReview
                | ParticipationStatus::ManualReview
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ParticipationStatus::AutoRejected
                | ParticipationStatus::Rejected
                | ParticipationStatus::Paid
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participation {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub status: ParticipationStatus,
    pub answers: serde_json::Value,
    pub feedback_text: String,
    pub fraud_score: Option<i32>,
    pub fraud_decision: Option<String>,
    pub fraud_reasons: Vec<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One uploaded proof artifact (screenshot) belonging to a participation.
/// The perceptual hash is null until the image_hash job computes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub participation_id: Uuid,
    pub slot_index: i32,
    pub storage_key: String,
    pub perceptual_hash: Option<i64>,
    pub created_at: DateTime<Utc>,
}
