//! ExecuteTaskHandler - Run one attempt of a task.
//!
//! 1. Claim: conditional PENDING -> PROCESSING in the store (attempts + 1)
//! 2. Invoke the handler for the task type under a deadline, holding no lock
//! 3. Record the outcome in a fresh store transaction
//! 4. Re-dispatch with backoff, or notify a terminal outcome

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::application::notify::notify_best_effort;
use crate::domain::foundation::{TaskId, Timestamp};
use crate::domain::ledger::LedgerError;
use crate::domain::task::{AsyncTask, BackoffPolicy, ExecutionError, TaskStatus};
use crate::ports::{
    LedgerNotification, LedgerStore, NotificationSink, TaskDispatcher, TaskHandlerRegistry,
};

/// What happened to the task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteTaskResult {
    /// Not PENDING, not due, or claimed by another worker.
    Skipped,
    Completed { task: AsyncTask },
    /// Back to PENDING; another attempt is scheduled.
    Retrying { task: AsyncTask, delay: Duration },
    Failed { task: AsyncTask },
}

/// Handler for task execution attempts.
pub struct ExecuteTaskHandler {
    store: Arc<dyn LedgerStore>,
    handlers: TaskHandlerRegistry,
    dispatcher: Arc<dyn TaskDispatcher>,
    notifier: Arc<dyn NotificationSink>,
    backoff: BackoffPolicy,
    attempt_timeout: Duration,
}

impl ExecuteTaskHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        handlers: TaskHandlerRegistry,
        dispatcher: Arc<dyn TaskDispatcher>,
        notifier: Arc<dyn NotificationSink>,
        backoff: BackoffPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            store,
            handlers,
            dispatcher,
            notifier,
            backoff,
            attempt_timeout,
        }
    }

    pub async fn handle(&self, task_id: TaskId) -> Result<ExecuteTaskResult, LedgerError> {
        let Some(claimed) = self.store.claim_task(&task_id, Timestamp::now()).await? else {
            tracing::debug!(task_id = %task_id, "Task not claimable, skipping");
            return Ok(ExecuteTaskResult::Skipped);
        };

        tracing::debug!(
            task_id = %task_id,
            task_type = %claimed.task_type,
            attempt = claimed.attempts,
            max_attempts = claimed.max_attempts,
            "Task attempt started"
        );

        let outcome = self.invoke(&claimed).await;
        let Some(task) = self.record(&claimed, outcome).await? else {
            tracing::warn!(
                task_id = %task_id,
                attempt = claimed.attempts,
                "Attempt was reclaimed as stale, discarding its outcome"
            );
            return Ok(ExecuteTaskResult::Skipped);
        };

        match task.status {
            TaskStatus::Completed => {
                tracing::info!(
                    task_id = %task.id,
                    account_id = %task.account_id,
                    attempts = task.attempts,
                    "Task completed"
                );
                notify_best_effort(
                    self.notifier.as_ref(),
                    LedgerNotification::TaskCompleted {
                        account_id: task.account_id,
                        task_id: task.id,
                        task_type: task.task_type.clone(),
                    },
                )
                .await;
                Ok(ExecuteTaskResult::Completed { task })
            }
            TaskStatus::Pending => {
                let delay = self.backoff.delay(task.attempts);
                tracing::warn!(
                    task_id = %task.id,
                    attempt = task.attempts,
                    max_attempts = task.max_attempts,
                    retry_in_secs = delay.as_secs(),
                    error = task.error.as_deref().unwrap_or_default(),
                    "Task attempt failed, retrying"
                );
                if let Err(e) = self.dispatcher.dispatch(task.id, delay).await {
                    tracing::warn!(task_id = %task.id, error = %e, "Retry dispatch failed, task left to the sweep");
                }
                Ok(ExecuteTaskResult::Retrying { task, delay })
            }
            _ => {
                let error = task.error.clone().unwrap_or_default();
                tracing::error!(
                    task_id = %task.id,
                    account_id = %task.account_id,
                    attempts = task.attempts,
                    error = %error,
                    "Task failed"
                );
                notify_best_effort(
                    self.notifier.as_ref(),
                    LedgerNotification::TaskFailed {
                        account_id: task.account_id,
                        task_id: task.id,
                        task_type: task.task_type.clone(),
                        error,
                    },
                )
                .await;
                Ok(ExecuteTaskResult::Failed { task })
            }
        }
    }

    async fn invoke(&self, task: &AsyncTask) -> Result<JsonValue, ExecutionError> {
        let Some(handler) = self.handlers.get(&task.task_type) else {
            return Err(ExecutionError::terminal(format!(
                "No handler registered for task type '{}'",
                task.task_type
            )));
        };

        match tokio::time::timeout(
            self.attempt_timeout,
            handler.invoke(&task.task_type, &task.input),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExecutionError::timeout(self.attempt_timeout)),
        }
    }

    /// Returns `None` if the stale sweep closed this attempt meanwhile.
    async fn record(
        &self,
        claimed: &AsyncTask,
        outcome: Result<JsonValue, ExecutionError>,
    ) -> Result<Option<AsyncTask>, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut task = tx
            .lock_task(&claimed.id)
            .await?
            .ok_or(LedgerError::TaskNotFound(claimed.id))?;
        if task.status != TaskStatus::Processing || task.attempts != claimed.attempts {
            return Ok(None);
        }

        let now = Timestamp::now();
        match outcome {
            Ok(result) => task.complete(result, now)?,
            Err(error) => {
                task.record_failure(&error, &self.backoff, now)?;
            }
        }

        tx.update_task(&task).await?;
        tx.commit().await?;
        Ok(Some(task))
    }
}
