//! Ledger error taxonomy surfaced to callers.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | InsufficientBalance | 402 |
//! | AccountNotFound | 404 |
//! | FeatureUnavailable | 404 |
//! | TaskNotFound | 404 |
//! | SubscriptionPlanNotFound | 404 |
//! | SubscriptionNotFound | 404 |
//! | InvalidAmount | 400 |
//! | UnsupportedKind | 400 |
//! | Validation | 400 |
//! | InvalidState | 409 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, PlanId, SubscriptionId, TaskId, ValidationError,
};

use super::TransactionKind;

/// Errors returned by ledger, feature, task and reconciliation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// A debit would take the balance below zero.
    #[error("Insufficient balance on account {account_id}: have {balance}, need {required}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: i64,
        required: i64,
    },

    #[error("Amount must be a positive number of points, got {0}")]
    InvalidAmount(i64),

    #[error("Transaction kind {} is not accepted here", .0.as_str())]
    UnsupportedKind(TransactionKind),

    /// No active price entry exists for the feature.
    #[error("Feature '{feature_key}' is not available")]
    FeatureUnavailable { feature_key: String },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Subscription plan not found: {0}")]
    SubscriptionPlanNotFound(PlanId),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Cannot {attempted} in state {current}")]
    InvalidState { current: String, attempted: String },

    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl LedgerError {
    pub fn feature_unavailable(feature_key: impl Into<String>) -> Self {
        LedgerError::FeatureUnavailable {
            feature_key: feature_key.into(),
        }
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        LedgerError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        LedgerError::Infrastructure(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            LedgerError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            LedgerError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            LedgerError::UnsupportedKind(_) => ErrorCode::UnsupportedKind,
            LedgerError::FeatureUnavailable { .. } => ErrorCode::FeatureUnavailable,
            LedgerError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            LedgerError::SubscriptionPlanNotFound(_) => ErrorCode::SubscriptionPlanNotFound,
            LedgerError::SubscriptionNotFound(_) => ErrorCode::SubscriptionNotFound,
            LedgerError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            LedgerError::Validation { .. } => ErrorCode::ValidationFailed,
            LedgerError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Status code the routing layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InsufficientBalance { .. } => 402,
            LedgerError::AccountNotFound(_)
            | LedgerError::FeatureUnavailable { .. }
            | LedgerError::TaskNotFound(_)
            | LedgerError::SubscriptionPlanNotFound(_)
            | LedgerError::SubscriptionNotFound(_) => 404,
            LedgerError::InvalidAmount(_)
            | LedgerError::UnsupportedKind(_)
            | LedgerError::Validation { .. } => 400,
            LedgerError::InvalidState { .. } => 409,
            LedgerError::Infrastructure(_) => 500,
        }
    }

    /// Only infrastructure failures are worth retrying; ledger rule
    /// violations are returned to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Infrastructure(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => LedgerError::Validation {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::InvalidStateTransition => LedgerError::InvalidState {
                current: "unknown".to_string(),
                attempted: err.message,
            },
            _ => LedgerError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        LedgerError::Validation {
            field,
            message: err.to_string(),
        }
    }
}

impl From<LedgerError> for DomainError {
    fn from(err: LedgerError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
