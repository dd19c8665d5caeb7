use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Balance-changing event kinds. `amount` is positive for topup/refund/bonus,
/// negative for consume; adjust may be either sign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Topup,
    Consume,
    Refund,
    Adjust,
    Bonus,
}

/// Per-advertiser spendable balance. `balance` is mutated only inside the
/// same transaction that appends a CreditTransaction, and must always equal
/// the running sum of transaction amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditWallet {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub balance: i64,
    pub total_topup: i64,
    pub total_consumed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only ledger row. Never updated or deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: i64,
    /// Snapshot of the wallet balance immediately after this row was applied.
    pub balance_after: i64,
    pub ref_type: Option<String>,
    pub ref_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
