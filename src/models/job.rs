use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a job in the durable store.
///
/// `Dead` jobs exhausted their retry budget and are parked for operator
/// inspection; they are never deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

/// Dispatch priority. High-priority jobs are always selected before medium,
/// medium before low; within a priority the order is scheduled_at then
/// created_at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPriority {
    High,
    Medium,
    Low,
}

impl JobPriority {
    /// Sort rank used by the due-job selection query.
    pub fn rank(self) -> i16 {
        match self {
            JobPriority::High => 0,
            JobPriority::Medium => 1,
            JobPriority::Low => 2,
        }
    }
}

/// Typed job payload, tagged by job type in the stored JSON.
///
/// Decoded at dequeue time; a payload that fails to decode fails the job
/// through the normal retry path instead of reaching a handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    ImageHash {
        asset_id: Uuid,
        storage_key: String,
    },
    TextSimilarity {
        participation_id: Uuid,
    },
    FraudCheck {
        participation_id: Uuid,
    },
    AiReport {
        campaign_id: Uuid,
    },
    SendEmail {
        template_type: String,
        recipient_email: String,
        recipient_type: String,
        recipient_id: Uuid,
        data: serde_json::Value,
    },
}

impl JobPayload {
    /// The stored job_type discriminant for this payload.
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::ImageHash { .. } => "image_hash",
            JobPayload::TextSimilarity { .. } => "text_similarity",
            JobPayload::FraudCheck { .. } => "fraud_check",
            JobPayload::AiReport { .. } => "ai_report",
            JobPayload::SendEmail { .. } => "send_email",
        }
    }
}

/// A queued unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the stored payload into its typed form.
    pub fn decode_payload(&self) -> Result<JobPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Parameters for enqueueing a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub max_attempts: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            priority: JobPriority::Medium,
            max_attempts: 3,
            scheduled_at: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay execution until the given time.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}
