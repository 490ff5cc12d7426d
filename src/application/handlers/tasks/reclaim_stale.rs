//! ReclaimStaleHandler - Recover tasks stuck in PROCESSING.
//!
//! An attempt is bounded by the attempt timeout, so a task still PROCESSING
//! well after that has lost its worker (crash, panic, failed write). Each
//! such task is closed as a retryable failure: PENDING with backoff, or
//! FAILED once its attempts are used up.

use std::sync::Arc;
use std::time::Duration;

use crate::application::notify::notify_best_effort;
use crate::domain::foundation::{TaskId, Timestamp};
use crate::domain::ledger::LedgerError;
use crate::domain::task::{BackoffPolicy, FailureDisposition};
use crate::ports::{LedgerNotification, LedgerStore, NotificationSink, TaskDispatcher};

/// Handler for the stale-attempt sweep.
pub struct ReclaimStaleHandler {
    store: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    notifier: Arc<dyn NotificationSink>,
    backoff: BackoffPolicy,
    stale_after: Duration,
}

impl ReclaimStaleHandler {
    /// `stale_after` must exceed the attempt timeout, or live attempts
    /// would be reclaimed.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        notifier: Arc<dyn NotificationSink>,
        backoff: BackoffPolicy,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            backoff,
            stale_after,
        }
    }

    /// Returns the number of tasks reclaimed.
    pub async fn handle(&self, limit: usize) -> Result<usize, LedgerError> {
        let cutoff = Timestamp::now().minus(self.stale_after);
        let stale = self.store.stale_task_ids(cutoff, limit).await?;
        let mut reclaimed = 0;

        for task_id in stale {
            if self.reclaim(task_id, cutoff).await? {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            tracing::info!(reclaimed, "Stale task attempts reclaimed");
        }
        Ok(reclaimed)
    }

    async fn reclaim(&self, task_id: TaskId, cutoff: Timestamp) -> Result<bool, LedgerError> {
        let mut tx = self.store.begin().await?;
        let Some(mut task) = tx.lock_task(&task_id).await? else {
            return Ok(false);
        };
        // Re-checked under the row lock: the worker may have reported back.
        if !task.is_stale(&cutoff) {
            return Ok(false);
        }

        let now = Timestamp::now();
        let disposition = task.abandon_attempt(&self.backoff, now)?;
        tx.update_task(&task).await?;
        tx.commit().await?;

        match disposition {
            FailureDisposition::Retry { scheduled_at } => {
                let delay = scheduled_at
                    .duration_since(&now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tracing::warn!(
                    task_id = %task.id,
                    attempt = task.attempts,
                    max_attempts = task.max_attempts,
                    retry_in_secs = delay.as_secs(),
                    "Stale task attempt reclaimed, retrying"
                );
                if let Err(e) = self.dispatcher.dispatch(task.id, delay).await {
                    tracing::warn!(task_id = %task.id, error = %e, "Retry dispatch failed, task left to the sweep");
                }
            }
            FailureDisposition::Failed => {
                tracing::error!(
                    task_id = %task.id,
                    account_id = %task.account_id,
                    attempts = task.attempts,
                    "Stale task attempt reclaimed, task failed"
                );
                notify_best_effort(
                    self.notifier.as_ref(),
                    LedgerNotification::TaskFailed {
                        account_id: task.account_id,
                        task_id: task.id,
                        task_type: task.task_type.clone(),
                        error: task.error.clone().unwrap_or_default(),
                    },
                )
                .await;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryLedgerStore, RecordingNotificationSink, RecordingTaskDispatcher};
    use crate::domain::foundation::{AccountId, TransactionId};
    use crate::domain::task::{AsyncTask, TaskMetadata, TaskStatus};
    use serde_json::json;

    const STALE_AFTER: Duration = Duration::from_secs(180);

    fn running_task(max_attempts: u32, started_secs_ago: u64) -> AsyncTask {
        let mut task = AsyncTask::new(
            AccountId::new(),
            "image",
            json!({}),
            max_attempts,
            TaskMetadata::charged(4, TransactionId::new()),
        )
        .unwrap();
        task.claim(Timestamp::now().minus(Duration::from_secs(started_secs_ago)))
            .unwrap();
        task
    }

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        dispatcher: RecordingTaskDispatcher,
        sink: RecordingNotificationSink,
        handler: ReclaimStaleHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let dispatcher = RecordingTaskDispatcher::new();
        let sink = RecordingNotificationSink::new();
        let handler = ReclaimStaleHandler::new(
            store.clone(),
            Arc::new(dispatcher.clone()),
            Arc::new(sink.clone()),
            BackoffPolicy::new(Duration::ZERO, Duration::ZERO),
            STALE_AFTER,
        );
        Fixture {
            store,
            dispatcher,
            sink,
            handler,
        }
    }

    #[tokio::test]
    async fn stale_attempt_goes_back_to_pending_and_is_dispatched() {
        let f = fixture();
        let task = running_task(3, 600);
        f.store.put_task(task.clone()).await;

        assert_eq!(f.handler.handle(10).await.unwrap(), 1);

        let stored = f.store.find_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(f.dispatcher.last().map(|d| d.task_id), Some(task.id));
    }

    #[tokio::test]
    async fn stale_last_attempt_fails_the_task() {
        let f = fixture();
        let task = running_task(1, 600);
        f.store.put_task(task.clone()).await;

        assert_eq!(f.handler.handle(10).await.unwrap(), 1);

        let stored = f.store.find_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.is_refundable());
        assert!(f.dispatcher.dispatches().is_empty());
        assert!(matches!(
            f.sink.notifications().last(),
            Some(LedgerNotification::TaskFailed { .. })
        ));
    }

    #[tokio::test]
    async fn recent_attempt_is_left_alone() {
        let f = fixture();
        let task = running_task(3, 5);
        f.store.put_task(task.clone()).await;

        assert_eq!(f.handler.handle(10).await.unwrap(), 0);
        let stored = f.store.find_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
    }
}
