//! CancelTaskHandler - Stop future attempts of a PENDING task.

use std::sync::Arc;

use crate::domain::foundation::{AccountId, TaskId, Timestamp};
use crate::domain::ledger::LedgerError;
use crate::domain::task::AsyncTask;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct CancelTaskCommand {
    pub task_id: TaskId,
    /// When set, only the owning account may cancel.
    pub account_id: Option<AccountId>,
}

/// Handler for administrative cancellation.
///
/// Only PENDING tasks can be cancelled; an attempt already in flight runs
/// to its outcome. The pre-debit stays until `RefundTaskHandler` is asked.
pub struct CancelTaskHandler {
    store: Arc<dyn LedgerStore>,
}

impl CancelTaskHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: CancelTaskCommand) -> Result<AsyncTask, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut task = tx
            .lock_task(&cmd.task_id)
            .await?
            .filter(|t| cmd.account_id.map_or(true, |owner| owner == t.account_id))
            .ok_or(LedgerError::TaskNotFound(cmd.task_id))?;

        task.cancel(Timestamp::now())?;
        tx.update_task(&task).await?;
        tx.commit().await?;

        tracing::info!(task_id = %task.id, account_id = %task.account_id, "Task cancelled");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::domain::foundation::TransactionId;
    use crate::domain::task::{TaskMetadata, TaskStatus};
    use serde_json::json;

    async fn stored_task(store: &InMemoryLedgerStore) -> AsyncTask {
        let task = AsyncTask::new(
            AccountId::new(),
            "image",
            json!({}),
            3,
            TaskMetadata::charged(4, TransactionId::new()),
        )
        .unwrap();
        store.put_task(task.clone()).await;
        task
    }

    #[tokio::test]
    async fn pending_task_is_cancelled() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let task = stored_task(&store).await;

        let cancelled = CancelTaskHandler::new(store.clone())
            .handle(CancelTaskCommand {
                task_id: task.id,
                account_id: Some(task.account_id),
            })
            .await
            .unwrap();

        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(store.claim_task(&task.id, Timestamp::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processing_task_cannot_be_cancelled() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let task = stored_task(&store).await;
        store.claim_task(&task.id, Timestamp::now()).await.unwrap();

        let err = CancelTaskHandler::new(store.clone())
            .handle(CancelTaskCommand {
                task_id: task.id,
                account_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidState { .. }));
        let stored = store.find_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
    }
}
