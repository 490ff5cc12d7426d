//! Ledger store port - the system of record.
//!
//! Every balance mutation happens inside a [`LedgerTx`] obtained from
//! [`LedgerStore::begin`]. A transaction that is dropped without
//! [`LedgerTx::commit`] is rolled back, so an early `?` return can never
//! leave a half-applied change behind.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! let mut account = tx
//!     .lock_account(&account_id)
//!     .await?
//!     .ok_or(LedgerError::AccountNotFound(account_id))?;
//! account.debit(3)?;
//! tx.update_account_balance(&account).await?;
//! tx.insert_transaction(&row).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{
    AccountId, DomainError, FeatureCostId, PlanId, SubscriptionId, TaskId, TenantId, Timestamp,
};
use crate::domain::ledger::{Account, CorrelationKeys, Transaction};
use crate::domain::pricing::{FeatureCost, FeatureUsage};
use crate::domain::subscription::{Subscription, SubscriptionPlan};
use crate::domain::task::AsyncTask;

/// Entry point to the store: opens units of work and serves reads and
/// single-statement writes that need no ledger lock.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a store transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError>;

    /// Persists a freshly opened account.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the id is taken
    async fn create_account(&self, account: &Account) -> Result<(), DomainError>;

    async fn find_account(&self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    /// All transactions of an account, newest first.
    async fn list_transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, DomainError>;

    async fn list_feature_usages(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<FeatureUsage>, DomainError>;

    /// Updates the active price for `(feature_key, tenant_id)` or inserts one.
    async fn upsert_feature_cost(
        &self,
        feature_key: &str,
        tenant_id: Option<&TenantId>,
        points_cost: i64,
    ) -> Result<FeatureCost, DomainError>;

    /// Soft-disables a price entry. Returns false if it does not exist.
    async fn disable_feature_cost(&self, id: &FeatureCostId) -> Result<bool, DomainError>;

    async fn save_plan(&self, plan: &SubscriptionPlan) -> Result<(), DomainError>;

    async fn find_plan(&self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError>;

    async fn find_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn find_subscription_for_plan(
        &self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn find_task(&self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError>;

    /// Atomically moves a due PENDING task to PROCESSING, incrementing
    /// `attempts` and setting `started_at`.
    ///
    /// Returns `None` if the task is missing, not PENDING, or not yet due,
    /// which includes the case where another worker claimed it first.
    async fn claim_task(&self, id: &TaskId, now: Timestamp)
        -> Result<Option<AsyncTask>, DomainError>;

    /// Ids of PENDING tasks with `scheduled_at <= now`, oldest first.
    async fn due_task_ids(&self, now: Timestamp, limit: usize) -> Result<Vec<TaskId>, DomainError>;

    /// Ids of PROCESSING tasks whose attempt started before `started_before`,
    /// oldest first. Their worker is presumed gone.
    async fn stale_task_ids(
        &self,
        started_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<TaskId>, DomainError>;

    /// Deletes COMPLETED, FAILED and CANCELLED tasks last updated before
    /// `cutoff`. Returns the number removed.
    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

/// One store transaction. Reads marked `lock_*` hold a row lock until
/// commit or rollback.
#[async_trait]
pub trait LedgerTx: Send {
    async fn lock_account(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    async fn update_account_balance(&mut self, account: &Account) -> Result<(), DomainError>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError>;

    /// Finds the transaction whose metadata matches any of `keys`.
    ///
    /// When several match, a PENDING one is preferred, then the newest.
    async fn lock_transaction_by_correlation(
        &mut self,
        keys: &CorrelationKeys,
    ) -> Result<Option<Transaction>, DomainError>;

    /// Persists status, metadata and `updated_at` of an existing row.
    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError>;

    /// Month counter recorded on the newest EARN grant for a subscription.
    async fn latest_month_counter(
        &mut self,
        account_id: &AccountId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<u32>, DomainError>;

    /// Active price entries for a feature, in any tenant scope.
    async fn active_feature_costs(
        &mut self,
        feature_key: &str,
    ) -> Result<Vec<FeatureCost>, DomainError>;

    async fn insert_feature_usage(&mut self, usage: &FeatureUsage) -> Result<(), DomainError>;

    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError>;

    async fn lock_subscription(
        &mut self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn lock_subscription_by_id(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Inserts or updates the single row for `(account_id, plan_id)`.
    async fn upsert_subscription(&mut self, subscription: &Subscription)
        -> Result<(), DomainError>;

    async fn insert_task(&mut self, task: &AsyncTask) -> Result<(), DomainError>;

    async fn lock_task(&mut self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError>;

    async fn update_task(&mut self, task: &AsyncTask) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn LedgerStore, _: Box<dyn LedgerTx>) {}

    #[test]
    fn ledger_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn LedgerStore>();
    }
}
