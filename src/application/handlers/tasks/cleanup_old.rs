//! CleanupOldHandler - Delete terminal tasks past the retention window.

use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::domain::ledger::LedgerError;
use crate::ports::LedgerStore;

/// Storage hygiene only. The charge and any refund stay in the
/// transaction ledger after the task row is gone.
pub struct CleanupOldHandler {
    store: Arc<dyn LedgerStore>,
}

impl CleanupOldHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the number of tasks deleted.
    pub async fn handle(&self, days_old: u32) -> Result<u64, LedgerError> {
        if days_old == 0 {
            return Err(LedgerError::validation(
                "days_old",
                "Retention window must be at least one day",
            ));
        }
        let cutoff = Timestamp::now().minus_days(i64::from(days_old));
        let deleted = self.store.delete_terminal_tasks_before(cutoff).await?;
        tracing::info!(deleted, days_old, "Old tasks cleaned up");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AccountId, TransactionId};
    use crate::adapters::InMemoryLedgerStore;
    use crate::domain::task::{AsyncTask, TaskMetadata};
    use serde_json::json;

    fn task() -> AsyncTask {
        AsyncTask::new(
            AccountId::new(),
            "image",
            json!({}),
            3,
            TaskMetadata::charged(1, TransactionId::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn removes_only_old_terminal_tasks() {
        let store = Arc::new(InMemoryLedgerStore::new());

        let mut old_cancelled = task();
        old_cancelled.cancel(Timestamp::now().minus_days(40)).unwrap();
        let mut recent_cancelled = task();
        recent_cancelled.cancel(Timestamp::now()).unwrap();
        let mut old_pending = task();
        old_pending.updated_at = Timestamp::now().minus_days(40);

        for t in [&old_cancelled, &recent_cancelled, &old_pending] {
            store.put_task(t.clone()).await;
        }

        let deleted = CleanupOldHandler::new(store.clone()).handle(30).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(store.find_task(&old_cancelled.id).await.unwrap().is_none());
        assert!(store.find_task(&recent_cancelled.id).await.unwrap().is_some());
        assert!(store.find_task(&old_pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn zero_day_window_is_rejected() {
        let store = Arc::new(InMemoryLedgerStore::new());
        assert!(CleanupOldHandler::new(store).handle(0).await.is_err());
    }
}
