//! AsyncTask aggregate.
//!
//! A task is created PENDING with its points already debited. The stored
//! row (status + `scheduled_at`) is the source of truth for whether it still
//! needs to run; in-process dispatch is only a shortcut.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{
    AccountId, StateMachine, TaskId, Timestamp, TransactionId, ValidationError,
};
use crate::domain::ledger::LedgerError;

use super::{BackoffPolicy, ExecutionError, TaskStatus};

/// Progress reported while a task is running. Never reaches 100 before
/// completion.
pub const MAX_RUNNING_PROGRESS: u8 = 95;

/// Charge bookkeeping stored with the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Points debited when the task was created.
    pub points_charged: i64,

    /// The REDEEM transaction of the pre-debit.
    pub charge_transaction_id: TransactionId,

    /// Set once the charge has been refunded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_transaction_id: Option<TransactionId>,

    #[serde(default, flatten)]
    pub extra: Map<String, JsonValue>,
}

impl TaskMetadata {
    pub fn charged(points: i64, transaction_id: TransactionId) -> Self {
        Self {
            points_charged: points,
            charge_transaction_id: transaction_id,
            refund_transaction_id: None,
            extra: Map::new(),
        }
    }
}

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to PENDING, due again at the given time.
    Retry { scheduled_at: Timestamp },
    /// Attempts exhausted or the error is terminal.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTask {
    pub id: TaskId,
    pub account_id: AccountId,
    pub task_type: String,
    pub input: JsonValue,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub scheduled_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub metadata: TaskMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AsyncTask {
    /// Creates a PENDING task due immediately.
    pub fn new(
        account_id: AccountId,
        task_type: impl Into<String>,
        input: JsonValue,
        max_attempts: u32,
        metadata: TaskMetadata,
    ) -> Result<Self, ValidationError> {
        let task_type = task_type.into();
        if task_type.trim().is_empty() {
            return Err(ValidationError::empty_field("task_type"));
        }
        if !(1..=100).contains(&max_attempts) {
            return Err(ValidationError::out_of_range(
                "max_attempts",
                1,
                100,
                i64::from(max_attempts),
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id: TaskId::new(),
            account_id,
            task_type,
            input,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts,
            result: None,
            error: None,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_due(&self, now: &Timestamp) -> bool {
        self.status == TaskStatus::Pending && !self.scheduled_at.is_after(now)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// PENDING -> PROCESSING for one attempt.
    pub fn claim(&mut self, now: Timestamp) -> Result<(), LedgerError> {
        self.transition(TaskStatus::Processing, "claim task")?;
        self.attempts += 1;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, result: JsonValue, now: Timestamp) -> Result<(), LedgerError> {
        self.transition(TaskStatus::Completed, "complete task")?;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed attempt and decides between retry and failure.
    pub fn record_failure(
        &mut self,
        error: &ExecutionError,
        backoff: &BackoffPolicy,
        now: Timestamp,
    ) -> Result<FailureDisposition, LedgerError> {
        let disposition = if error.is_retryable() && self.attempts < self.max_attempts {
            self.transition(TaskStatus::Pending, "retry task")?;
            self.scheduled_at = now.plus(backoff.delay(self.attempts));
            FailureDisposition::Retry {
                scheduled_at: self.scheduled_at,
            }
        } else {
            self.transition(TaskStatus::Failed, "fail task")?;
            self.completed_at = Some(now);
            FailureDisposition::Failed
        };
        self.error = Some(error.message().to_string());
        self.updated_at = now;
        Ok(disposition)
    }

    /// True if the task is still PROCESSING from an attempt started before
    /// `cutoff`.
    pub fn is_stale(&self, cutoff: &Timestamp) -> bool {
        self.status == TaskStatus::Processing
            && self.started_at.map_or(true, |started| started.is_before(cutoff))
    }

    /// Closes an attempt whose worker never reported back (crash, panic,
    /// lost write). The attempt was counted at claim time, so this retries
    /// or fails exactly like a retryable error would.
    pub fn abandon_attempt(
        &mut self,
        backoff: &BackoffPolicy,
        now: Timestamp,
    ) -> Result<FailureDisposition, LedgerError> {
        let error = ExecutionError::retryable("Attempt abandoned: worker did not report back");
        self.record_failure(&error, backoff, now)
    }

    /// Prevents future attempts. Only valid while PENDING.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), LedgerError> {
        self.transition(TaskStatus::Cancelled, "cancel task")?;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// True if the pre-debit may still be refunded.
    pub fn is_refundable(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::Cancelled)
            && self.metadata.refund_transaction_id.is_none()
    }

    pub fn mark_refunded(&mut self, transaction_id: TransactionId) -> Result<(), LedgerError> {
        if !self.is_refundable() {
            return Err(LedgerError::invalid_state(
                self.status.as_str(),
                "refund task",
            ));
        }
        self.metadata.refund_transaction_id = Some(transaction_id);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Informational progress percentage.
    pub fn progress(&self, now: &Timestamp, expected: Duration) -> u8 {
        match self.status {
            TaskStatus::Completed => 100,
            TaskStatus::Pending | TaskStatus::Failed | TaskStatus::Cancelled => 0,
            TaskStatus::Processing => {
                let Some(started) = self.started_at else {
                    return 0;
                };
                let elapsed_ms = now.duration_since(&started).num_milliseconds().max(0) as u128;
                let expected_ms = expected.as_millis().max(1);
                let pct = (elapsed_ms * 100 / expected_ms).min(u128::from(MAX_RUNNING_PROGRESS));
                pct as u8
            }
        }
    }

    fn transition(&mut self, target: TaskStatus, attempted: &str) -> Result<(), LedgerError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| LedgerError::invalid_state(self.status.as_str(), attempted))?;
        Ok(())
    }
}
