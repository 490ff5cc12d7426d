//! In-memory ledger store.
//!
//! Useful for:
//! - Unit and integration tests
//! - Single-process development without a database
//!
//! A [`LedgerTx`] holds the store-wide lock for its whole lifetime and works
//! on a private copy of the state. Commit swaps the copy in; dropping the
//! transaction discards it. Transactions are therefore fully serialized,
//! which is stricter than the row locks the Postgres adapter takes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, FeatureCostId, PlanId, SubscriptionId, TaskId, TenantId,
    Timestamp,
};
use crate::domain::ledger::{Account, CorrelationKeys, Transaction, TransactionKind, TransactionStatus};
use crate::domain::pricing::{FeatureCost, FeatureUsage};
use crate::domain::subscription::{Subscription, SubscriptionPlan};
use crate::domain::task::AsyncTask;
use crate::ports::{LedgerStore, LedgerTx};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    /// Insertion order is chronological.
    transactions: Vec<Transaction>,
    feature_costs: Vec<FeatureCost>,
    usages: Vec<FeatureUsage>,
    plans: HashMap<PlanId, SubscriptionPlan>,
    subscriptions: Vec<Subscription>,
    tasks: HashMap<TaskId, AsyncTask>,
}

/// In-memory implementation of the `LedgerStore` port.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryLedgerStore::new());
/// store.create_account(&Account::open(AccountId::new(), None)).await?;
/// store.upsert_feature_cost("image", None, 3).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    armed_failure: Arc<Mutex<Option<&'static str>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to the named transaction operation fail with a
    /// database error. Used to exercise rollback paths.
    pub async fn fail_next(&self, operation: &'static str) {
        *self.armed_failure.lock().await = Some(operation);
    }

    /// Overwrites a stored task. Lets tests move `scheduled_at` around.
    pub async fn put_task(&self, task: AsyncTask) {
        self.state.lock().await.tasks.insert(task.id, task);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryLedgerTx {
            guard,
            working,
            armed_failure: self.armed_failure.clone(),
        }))
    }

    async fn create_account(&self, account: &Account) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id) {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Account {} already exists", account.id),
            ));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        Ok(self.state.lock().await.accounts.get(id).cloned())
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account_id == *account_id)
            .cloned()
            .collect())
    }

    async fn list_feature_usages(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<FeatureUsage>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .usages
            .iter()
            .filter(|u| u.account_id == *account_id)
            .cloned()
            .collect())
    }

    async fn upsert_feature_cost(
        &self,
        feature_key: &str,
        tenant_id: Option<&TenantId>,
        points_cost: i64,
    ) -> Result<FeatureCost, DomainError> {
        let mut state = self.state.lock().await;
        let existing = state.feature_costs.iter_mut().find(|c| {
            c.is_active && c.feature_key == feature_key && c.tenant_id.as_ref() == tenant_id
        });
        if let Some(cost) = existing {
            cost.reprice(points_cost)?;
            return Ok(cost.clone());
        }

        let cost = FeatureCost::new(feature_key, tenant_id.cloned(), points_cost)?;
        state.feature_costs.push(cost.clone());
        Ok(cost)
    }

    async fn disable_feature_cost(&self, id: &FeatureCostId) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        match state.feature_costs.iter_mut().find(|c| c.id == *id) {
            Some(cost) => {
                cost.disable();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_plan(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        self.state.lock().await.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn find_plan(&self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self.state.lock().await.plans.get(id).cloned())
    }

    async fn find_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.lock().await;
        Ok(state.subscriptions.iter().find(|s| s.id == *id).cloned())
    }

    async fn find_subscription_for_plan(
        &self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.account_id == *account_id && s.plan_id == *plan_id)
            .cloned())
    }

    async fn find_task(&self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError> {
        Ok(self.state.lock().await.tasks.get(id).cloned())
    }

    async fn claim_task(
        &self,
        id: &TaskId,
        now: Timestamp,
    ) -> Result<Option<AsyncTask>, DomainError> {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return Ok(None);
        };
        if !task.is_due(&now) {
            return Ok(None);
        }
        task.claim(now)
            .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))?;
        Ok(Some(task.clone()))
    }

    async fn due_task_ids(&self, now: Timestamp, limit: usize) -> Result<Vec<TaskId>, DomainError> {
        let state = self.state.lock().await;
        let mut due: Vec<&AsyncTask> = state.tasks.values().filter(|t| t.is_due(&now)).collect();
        due.sort_by_key(|t| (t.scheduled_at, t.created_at));
        Ok(due.into_iter().take(limit).map(|t| t.id).collect())
    }

    async fn stale_task_ids(
        &self,
        started_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<TaskId>, DomainError> {
        let state = self.state.lock().await;
        let mut stale: Vec<&AsyncTask> = state
            .tasks
            .values()
            .filter(|t| t.is_stale(&started_before))
            .collect();
        stale.sort_by_key(|t| (t.started_at, t.created_at));
        Ok(stale.into_iter().take(limit).map(|t| t.id).collect())
    }

    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.lock().await;
        let before = state.tasks.len();
        state.tasks.retain(|_, t| {
            let finished = t.completed_at.unwrap_or(t.updated_at);
            !(t.is_terminal() && finished.is_before(&cutoff))
        });
        Ok((before - state.tasks.len()) as u64)
    }
}

/// Unit of work over a private copy of the state.
pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    armed_failure: Arc<Mutex<Option<&'static str>>>,
}

impl InMemoryLedgerTx {
    async fn failpoint(&self, operation: &'static str) -> Result<(), DomainError> {
        let mut armed = self.armed_failure.lock().await;
        if *armed == Some(operation) {
            *armed = None;
            return Err(DomainError::database(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_account(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        self.failpoint("lock_account").await?;
        Ok(self.working.accounts.get(id).cloned())
    }

    async fn update_account_balance(&mut self, account: &Account) -> Result<(), DomainError> {
        self.failpoint("update_account_balance").await?;
        match self.working.accounts.get_mut(&account.id) {
            Some(stored) => {
                stored.balance = account.balance;
                stored.updated_at = account.updated_at;
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::AccountNotFound,
                format!("Account not found: {}", account.id),
            )),
        }
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError> {
        self.failpoint("insert_transaction").await?;
        if self.working.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Transaction {} already exists", transaction.id),
            ));
        }
        self.working.transactions.push(transaction.clone());
        Ok(())
    }

    async fn lock_transaction_by_correlation(
        &mut self,
        keys: &CorrelationKeys,
    ) -> Result<Option<Transaction>, DomainError> {
        self.failpoint("lock_transaction_by_correlation").await?;
        if keys.is_empty() {
            return Ok(None);
        }
        // Newest first.
        let hits: Vec<&Transaction> = self
            .working
            .transactions
            .iter()
            .rev()
            .filter(|t| keys.matches(&t.metadata))
            .collect();
        let chosen = hits
            .iter()
            .find(|t| t.is_pending())
            .or_else(|| hits.first())
            .map(|t| (*t).clone());
        Ok(chosen)
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError> {
        self.failpoint("update_transaction").await?;
        match self
            .working
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction.id)
        {
            Some(stored) => {
                stored.status = transaction.status;
                stored.metadata = transaction.metadata.clone();
                stored.updated_at = transaction.updated_at;
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction not found: {}", transaction.id),
            )),
        }
    }

    async fn latest_month_counter(
        &mut self,
        account_id: &AccountId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<u32>, DomainError> {
        Ok(self
            .working
            .transactions
            .iter()
            .rev()
            .find(|t| {
                t.account_id == *account_id
                    && t.kind == TransactionKind::Earn
                    && t.status == TransactionStatus::Completed
                    && t.metadata.subscription_id == Some(*subscription_id)
                    && t.metadata.month.is_some()
            })
            .and_then(|t| t.metadata.month))
    }

    async fn active_feature_costs(
        &mut self,
        feature_key: &str,
    ) -> Result<Vec<FeatureCost>, DomainError> {
        Ok(self
            .working
            .feature_costs
            .iter()
            .filter(|c| c.is_active && c.feature_key == feature_key)
            .cloned()
            .collect())
    }

    async fn insert_feature_usage(&mut self, usage: &FeatureUsage) -> Result<(), DomainError> {
        self.failpoint("insert_feature_usage").await?;
        self.working.usages.push(usage.clone());
        Ok(())
    }

    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError> {
        Ok(self.working.plans.get(id).cloned())
    }

    async fn lock_subscription(
        &mut self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .find(|s| s.account_id == *account_id && s.plan_id == *plan_id)
            .cloned())
    }

    async fn lock_subscription_by_id(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .find(|s| s.id == *id)
            .cloned())
    }

    async fn upsert_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), DomainError> {
        self.failpoint("upsert_subscription").await?;
        let existing = self.working.subscriptions.iter_mut().find(|s| {
            s.account_id == subscription.account_id && s.plan_id == subscription.plan_id
        });
        match existing {
            Some(stored) => {
                stored.start_date = subscription.start_date;
                stored.end_date = subscription.end_date;
                stored.is_active = subscription.is_active;
                stored.auto_renew = subscription.auto_renew;
                stored.updated_at = subscription.updated_at;
            }
            None => self.working.subscriptions.push(subscription.clone()),
        }
        Ok(())
    }

    async fn insert_task(&mut self, task: &AsyncTask) -> Result<(), DomainError> {
        self.failpoint("insert_task").await?;
        if self.working.tasks.contains_key(&task.id) {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Task {} already exists", task.id),
            ));
        }
        self.working.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn lock_task(&mut self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError> {
        Ok(self.working.tasks.get(id).cloned())
    }

    async fn update_task(&mut self, task: &AsyncTask) -> Result<(), DomainError> {
        self.failpoint("update_task").await?;
        match self.working.tasks.get_mut(&task.id) {
            Some(stored) => {
                *stored = task.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::TaskNotFound,
                format!("Task not found: {}", task.id),
            )),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryLedgerTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
