use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error surface of the write API. Every rejection maps to a machine-readable
/// code plus a human-readable message; business rejections are expected
/// outcomes, not server faults.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("campaign is not accepting submissions")]
    CampaignClosed,

    #[error("campaign has reached its participant limit")]
    CampaignFull,

    #[error("daily participation limit reached for this campaign")]
    DailyLimitReached,

    #[error("user has already participated in this campaign")]
    AlreadyParticipated,

    #[error("wallet balance is insufficient: has {balance}, needs {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("operation not allowed in status '{current}'")]
    StatusConflict { current: String },

    #[error("payment could not be confirmed: {0}")]
    PaymentNotConfirmed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::CampaignClosed => "CAMPAIGN_CLOSED",
            ApiError::CampaignFull => "CAMPAIGN_FULL",
            ApiError::DailyLimitReached => "DAILY_LIMIT_REACHED",
            ApiError::AlreadyParticipated => "ALREADY_PARTICIPATED",
            ApiError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ApiError::StatusConflict { .. } => "STATUS_CONFLICT",
            ApiError::PaymentNotConfirmed(_) => "PAYMENT_NOT_CONFIRMED",
            ApiError::Database(_) => "INTERNAL_ERROR",
            ApiError::Storage(_) => "STORAGE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::PaymentNotConfirmed(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::CampaignClosed
            | ApiError::CampaignFull
            | ApiError::DailyLimitReached
            | ApiError::AlreadyParticipated
            | ApiError::InsufficientBalance { .. }
            | ApiError::StatusConflict { .. } => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            // Internal detail stays out of responses for server faults.
            message: if status.is_server_error() {
                "internal error".to_string()
            } else {
                self.to_string()
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::Validation(report.to_string())
    }
}

impl From<crate::db::wallet_queries::LedgerError> for ApiError {
    fn from(err: crate::db::wallet_queries::LedgerError) -> Self {
        use crate::db::wallet_queries::LedgerError;
        match err {
            LedgerError::WalletNotFound => ApiError::NotFound("wallet"),
            LedgerError::NonPositiveAmount => {
                ApiError::Validation("amount must be positive".to_string())
            }
            LedgerError::InsufficientBalance { balance, required } => {
                ApiError::InsufficientBalance { balance, required }
            }
            LedgerError::Overflow => {
                ApiError::Validation("amount out of range".to_string())
            }
            LedgerError::Db(e) => ApiError::Database(e),
        }
    }
}

impl From<crate::db::participation_queries::ReviewError> for ApiError {
    fn from(err: crate::db::participation_queries::ReviewError) -> Self {
        use crate::db::participation_queries::ReviewError;
        match err {
            ReviewError::NotFound => ApiError::NotFound("participation"),
            ReviewError::StatusConflict { current } => ApiError::StatusConflict { current },
            ReviewError::Ledger(e) => e.into(),
            ReviewError::Db(e) => ApiError::Database(e),
        }
    }
}

impl From<crate::db::reward_queries::RewardError> for ApiError {
    fn from(err: crate::db::reward_queries::RewardError) -> Self {
        use crate::db::reward_queries::RewardError;
        match err {
            RewardError::NotFound => ApiError::NotFound("reward"),
            RewardError::StatusConflict { current } => ApiError::StatusConflict { current },
            RewardError::Db(e) => ApiError::Database(e),
        }
    }
}
