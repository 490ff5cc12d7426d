//! Notification sink port.
//!
//! Fire-and-forget delivery of payment and task outcomes. A failing sink
//! never fails the ledger operation that produced the notification.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{AccountId, DomainError, SubscriptionId, TaskId, Timestamp, TransactionId};
use crate::domain::ledger::{TransactionKind, TransactionStatus};

/// Outcome pushed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerNotification {
    PaymentCompleted {
        account_id: AccountId,
        transaction_id: TransactionId,
        kind: TransactionKind,
        points_credited: i64,
        new_balance: i64,
    },
    PaymentNotCompleted {
        account_id: AccountId,
        transaction_id: TransactionId,
        kind: TransactionKind,
        status: TransactionStatus,
    },
    SubscriptionRenewed {
        account_id: AccountId,
        subscription_id: SubscriptionId,
        month: u32,
        end_date: Timestamp,
    },
    TaskCompleted {
        account_id: AccountId,
        task_id: TaskId,
        task_type: String,
    },
    TaskFailed {
        account_id: AccountId,
        task_id: TaskId,
        task_type: String,
        error: String,
    },
}

impl LedgerNotification {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerNotification::PaymentCompleted { .. } => "payment_completed",
            LedgerNotification::PaymentNotCompleted { .. } => "payment_not_completed",
            LedgerNotification::SubscriptionRenewed { .. } => "subscription_renewed",
            LedgerNotification::TaskCompleted { .. } => "task_completed",
            LedgerNotification::TaskFailed { .. } => "task_failed",
        }
    }

    pub fn account_id(&self) -> AccountId {
        match self {
            LedgerNotification::PaymentCompleted { account_id, .. }
            | LedgerNotification::PaymentNotCompleted { account_id, .. }
            | LedgerNotification::SubscriptionRenewed { account_id, .. }
            | LedgerNotification::TaskCompleted { account_id, .. }
            | LedgerNotification::TaskFailed { account_id, .. } => *account_id,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &LedgerNotification) -> Result<(), DomainError>;
}
