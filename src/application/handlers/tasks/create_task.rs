//! CreateTaskHandler - Pre-debit and enqueue an asynchronous task.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::application::handlers::ledger::{lock_account, post_transaction};
use crate::domain::foundation::{AccountId, TenantId};
use crate::domain::ledger::{LedgerError, Transaction, TransactionKind, TransactionMetadata};
use crate::domain::pricing::resolve_cost;
use crate::domain::task::{AsyncTask, TaskMetadata};
use crate::ports::{LedgerStore, TaskDispatcher};

/// Command to start a task.
#[derive(Debug, Clone)]
pub struct CreateTaskCommand {
    pub account_id: AccountId,
    /// Also the feature key the task is priced under.
    pub task_type: String,
    pub input: JsonValue,
    pub max_attempts: Option<u32>,
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskResult {
    pub task: AsyncTask,
    pub charge: Transaction,
    pub new_balance: i64,
}

/// Handler for task creation.
///
/// The REDEEM debit and the PENDING task row commit together. Dispatch
/// happens after commit and never fails the request: an undelivered task
/// is found by the periodic sweep.
pub struct CreateTaskHandler {
    store: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    default_max_attempts: u32,
}

impl CreateTaskHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        default_max_attempts: u32,
    ) -> Self {
        Self {
            store,
            dispatcher,
            default_max_attempts,
        }
    }

    pub async fn handle(&self, cmd: CreateTaskCommand) -> Result<CreateTaskResult, LedgerError> {
        let task_type = cmd.task_type.trim().to_string();
        if task_type.is_empty() {
            return Err(LedgerError::validation("task_type", "Task type is required"));
        }
        let max_attempts = cmd.max_attempts.unwrap_or(self.default_max_attempts);

        let mut tx = self.store.begin().await?;
        let costs = tx.active_feature_costs(&task_type).await?;
        if resolve_cost(&costs, &task_type, cmd.tenant_id.as_ref()).is_none() {
            return Err(LedgerError::feature_unavailable(task_type.as_str()));
        }

        let mut account = lock_account(tx.as_mut(), cmd.account_id).await?;
        let tenant = cmd.tenant_id.or_else(|| account.tenant_id.clone());
        let cost = resolve_cost(&costs, &task_type, tenant.as_ref())
            .cloned()
            .ok_or_else(|| LedgerError::feature_unavailable(task_type.as_str()))?;

        let mut charge = Transaction::completed(
            account.id,
            cost.points_cost,
            TransactionKind::Redeem,
            format!("Task {}", task_type),
            TransactionMetadata::new().with_feature_key(task_type.as_str()),
        );
        let task = AsyncTask::new(
            account.id,
            task_type.as_str(),
            cmd.input,
            max_attempts,
            TaskMetadata::charged(cost.points_cost, charge.id),
        )?;
        charge.metadata.task_id = Some(task.id);

        let new_balance = post_transaction(tx.as_mut(), &mut account, &charge).await?;
        tx.insert_task(&task).await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account.id,
            task_id = %task.id,
            task_type = %task.task_type,
            points = cost.points_cost,
            new_balance,
            "Task created"
        );

        if let Err(e) = self.dispatcher.dispatch(task.id, Duration::ZERO).await {
            tracing::warn!(task_id = %task.id, error = %e, "Dispatch failed, task left to the sweep");
        }

        Ok(CreateTaskResult {
            task,
            charge,
            new_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryLedgerStore, RecordingTaskDispatcher};
    use crate::application::handlers::ledger::{ApplyDeltaCommand, ApplyDeltaHandler};
    use crate::domain::ledger::Account;
    use crate::domain::task::TaskStatus;
    use serde_json::json;

    async fn setup(balance: i64) -> (Arc<InMemoryLedgerStore>, RecordingTaskDispatcher, AccountId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.upsert_feature_cost("image", None, 4).await.unwrap();
        let id = AccountId::new();
        store.create_account(&Account::open(id, None)).await.unwrap();
        if balance > 0 {
            ApplyDeltaHandler::new(store.clone())
                .handle(ApplyDeltaCommand::new(id, balance, TransactionKind::Topup))
                .await
                .unwrap();
        }
        (store, RecordingTaskDispatcher::new(), id)
    }

    fn command(account_id: AccountId) -> CreateTaskCommand {
        CreateTaskCommand {
            account_id,
            task_type: "image".to_string(),
            input: json!({ "prompt": "a lighthouse" }),
            max_attempts: None,
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn debits_persists_and_dispatches() {
        let (store, dispatcher, id) = setup(10).await;
        let handler = CreateTaskHandler::new(store.clone(), Arc::new(dispatcher.clone()), 3);

        let result = handler.handle(command(id)).await.unwrap();

        assert_eq!(result.new_balance, 6);
        assert_eq!(result.task.status, TaskStatus::Pending);
        assert_eq!(result.task.attempts, 0);
        assert_eq!(result.task.max_attempts, 3);
        assert_eq!(result.task.metadata.points_charged, 4);
        assert_eq!(result.task.metadata.charge_transaction_id, result.charge.id);
        assert_eq!(result.charge.metadata.task_id, Some(result.task.id));

        let stored = store.find_task(&result.task.id).await.unwrap().unwrap();
        assert_eq!(stored, result.task);
        assert_eq!(dispatcher.last().map(|d| d.task_id), Some(result.task.id));
    }

    #[tokio::test]
    async fn insufficient_balance_creates_nothing() {
        let (store, dispatcher, id) = setup(3).await;
        let handler = CreateTaskHandler::new(store.clone(), Arc::new(dispatcher.clone()), 3);

        let err = handler.handle(command(id)).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(store.find_account(&id).await.unwrap().unwrap().balance, 3);
        assert!(store.due_task_ids(crate::domain::foundation::Timestamp::now(), 10).await.unwrap().is_empty());
        assert!(dispatcher.dispatches().is_empty());
    }

    #[tokio::test]
    async fn invalid_max_attempts_rolls_back() {
        let (store, dispatcher, id) = setup(10).await;
        let handler = CreateTaskHandler::new(store.clone(), Arc::new(dispatcher), 3);
        let mut cmd = command(id);
        cmd.max_attempts = Some(0);

        let err = handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, LedgerError::Validation { .. }));
        assert_eq!(store.find_account(&id).await.unwrap().unwrap().balance, 10);
    }

    #[tokio::test]
    async fn unpriced_task_type_is_unavailable() {
        let (store, dispatcher, id) = setup(10).await;
        let handler = CreateTaskHandler::new(store, Arc::new(dispatcher), 3);
        let mut cmd = command(id);
        cmd.task_type = "video".to_string();

        let err = handler.handle(cmd).await.unwrap_err();
        assert_eq!(err, LedgerError::feature_unavailable("video"));
    }

    #[tokio::test]
    async fn unpriced_task_type_is_reported_before_missing_account() {
        let (store, dispatcher, _) = setup(0).await;
        let handler = CreateTaskHandler::new(store, Arc::new(dispatcher), 3);
        let mut cmd = command(AccountId::new());
        cmd.task_type = "video".to_string();

        let err = handler.handle(cmd).await.unwrap_err();
        assert_eq!(err, LedgerError::feature_unavailable("video"));
    }
}
