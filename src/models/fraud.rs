use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kinds of abuse signals the pipeline can record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalType {
    DuplicateImage,
    DuplicateText,
    SubmissionVelocity,
    AccountHistory,
}

/// Routing outcome of fraud-score aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FraudDecision {
    /// Score at or above the reject threshold; no human review.
    AutoReject,
    /// Signals present but below the threshold; flagged for priority scrutiny.
    ManualReview,
    /// No material signals; still requires ordinary human sign-off.
    Pass,
}

/// One contribution to a participation's aggregate fraud score.
/// Immutable once written; the audit trail behind every decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudSignal {
    pub id: Uuid,
    pub participation_id: Uuid,
    pub signal_type: SignalType,
    pub signal_value: String,
    pub score: i32,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A signal produced during evaluation, before persistence.
#[derive(Debug, Clone)]
pub struct NewFraudSignal {
    pub signal_type: SignalType,
    pub signal_value: String,
    pub score: i32,
    pub details: serde_json::Value,
}
