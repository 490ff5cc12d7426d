//! RefundTaskHandler - Return the pre-debit of a failed or cancelled task.

use std::sync::Arc;

use crate::application::handlers::ledger::{lock_account, post_transaction};
use crate::domain::foundation::{TaskId, TransactionId};
use crate::domain::ledger::{LedgerError, Transaction, TransactionKind, TransactionMetadata};
use crate::domain::task::TaskStatus;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct RefundTaskCommand {
    pub task_id: TaskId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum RefundTaskResult {
    Refunded {
        transaction: Transaction,
        new_balance: i64,
    },
    /// An earlier call already refunded this task.
    AlreadyRefunded { transaction_id: TransactionId },
}

/// Handler for task refunds.
///
/// The REFUND row and the task's `refund_transaction_id` are written in one
/// store transaction, so a task is refunded at most once.
pub struct RefundTaskHandler {
    store: Arc<dyn LedgerStore>,
}

impl RefundTaskHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: RefundTaskCommand) -> Result<RefundTaskResult, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut task = tx
            .lock_task(&cmd.task_id)
            .await?
            .ok_or(LedgerError::TaskNotFound(cmd.task_id))?;

        if let Some(transaction_id) = task.metadata.refund_transaction_id {
            tracing::debug!(task_id = %task.id, "Task already refunded");
            return Ok(RefundTaskResult::AlreadyRefunded { transaction_id });
        }
        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Err(LedgerError::invalid_state(task.status.as_str(), "refund task"));
        }

        let reason = if cmd.reason.trim().is_empty() {
            format!("Refund for task {}", task.id)
        } else {
            cmd.reason
        };
        let transaction = Transaction::completed(
            task.account_id,
            task.metadata.points_charged,
            TransactionKind::Refund,
            reason,
            TransactionMetadata::new()
                .with_task(task.id)
                .with_related(task.metadata.charge_transaction_id),
        );

        let mut account = lock_account(tx.as_mut(), task.account_id).await?;
        let new_balance = post_transaction(tx.as_mut(), &mut account, &transaction).await?;
        task.mark_refunded(transaction.id)?;
        tx.update_task(&task).await?;
        tx.commit().await?;

        tracing::info!(
            task_id = %task.id,
            account_id = %task.account_id,
            transaction_id = %transaction.id,
            amount = transaction.amount,
            new_balance,
            "Task refunded"
        );

        Ok(RefundTaskResult::Refunded {
            transaction,
            new_balance,
        })
    }
}
