//! GetTaskStatusHandler - Query for polling a task.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{AccountId, TaskId, Timestamp};
use crate::domain::ledger::LedgerError;
use crate::domain::task::TaskStatus;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct GetTaskStatusQuery {
    pub task_id: TaskId,
    /// When set, tasks of other accounts are reported as not found.
    pub account_id: Option<AccountId>,
}

/// Polling view of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusView {
    pub task_id: TaskId,
    pub task_type: String,
    pub status: TaskStatus,
    /// 0-100, informational only.
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub points_charged: i64,
    pub refunded: bool,
    pub scheduled_at: Timestamp,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

pub struct GetTaskStatusHandler {
    store: Arc<dyn LedgerStore>,
    expected_duration: Duration,
}

impl GetTaskStatusHandler {
    pub fn new(store: Arc<dyn LedgerStore>, expected_duration: Duration) -> Self {
        Self {
            store,
            expected_duration,
        }
    }

    pub async fn handle(&self, query: GetTaskStatusQuery) -> Result<TaskStatusView, LedgerError> {
        let task = self
            .store
            .find_task(&query.task_id)
            .await?
            .filter(|t| query.account_id.map_or(true, |owner| owner == t.account_id))
            .ok_or(LedgerError::TaskNotFound(query.task_id))?;

        Ok(TaskStatusView {
            task_id: task.id,
            progress: task.progress(&Timestamp::now(), self.expected_duration),
            task_type: task.task_type,
            status: task.status,
            attempts: task.attempts,
            max_attempts: task.max_attempts,
            result: task.result,
            error: task.error,
            points_charged: task.metadata.points_charged,
            refunded: task.metadata.refund_transaction_id.is_some(),
            scheduled_at: task.scheduled_at,
            created_at: task.created_at,
            completed_at: task.completed_at,
        })
    }
}
