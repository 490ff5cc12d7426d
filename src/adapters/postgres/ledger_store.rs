//! PostgreSQL implementation of LedgerStore.
//!
//! Balance changes serialize on `SELECT ... FOR UPDATE` of the account row.
//! Task claiming is a single conditional `UPDATE ... WHERE status = 'PENDING'`
//! so two workers can never both move the same task to PROCESSING.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, FeatureCostId, PlanId, SubscriptionId, TaskId, TenantId,
    Timestamp,
};
use crate::domain::ledger::{Account, CorrelationKeys, Transaction};
use crate::domain::pricing::{FeatureCost, FeatureUsage};
use crate::domain::subscription::{Subscription, SubscriptionPlan};
use crate::domain::task::AsyncTask;
use crate::ports::{LedgerStore, LedgerTx};

use super::rows::{
    to_i32, AccountRow, FeatureCostRow, FeatureUsageRow, PlanRow, SubscriptionRow, TaskRow,
    TransactionRow, ACCOUNT_COLUMNS, FEATURE_COST_COLUMNS, FEATURE_USAGE_COLUMNS, PLAN_COLUMNS,
    SUBSCRIPTION_COLUMNS, TASK_COLUMNS, TRANSACTION_COLUMNS,
};

/// Creates the connection pool described by `config`.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::database("Failed to connect to PostgreSQL", e))
}

/// PostgreSQL implementation of the LedgerStore port.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to run migrations", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }

    async fn create_account(&self, account: &Account) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, tenant_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.balance)
        .bind(account.tenant_id.as_ref().map(TenantId::as_str))
        .bind(account.created_at.as_datetime())
        .bind(account.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on(e, "accounts_pkey", "Failed to create account", || {
                format!("Account {} already exists", account.id)
            })
        })?;
        Ok(())
    }

    async fn find_account(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find account", e))?
            .map(Account::try_from)
            .transpose()
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Transaction>, DomainError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE account_id = $1 ORDER BY created_at DESC, id",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to list transactions", e))?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn list_feature_usages(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<FeatureUsage>, DomainError> {
        let sql = format!(
            "SELECT {} FROM feature_usages WHERE account_id = $1 ORDER BY created_at",
            FEATURE_USAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, FeatureUsageRow>(&sql)
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to list feature usages", e))?;
        Ok(rows.into_iter().map(FeatureUsage::from).collect())
    }

    async fn upsert_feature_cost(
        &self,
        feature_key: &str,
        tenant_id: Option<&TenantId>,
        points_cost: i64,
    ) -> Result<FeatureCost, DomainError> {
        // Validates key and price before touching the table.
        let fresh = FeatureCost::new(feature_key, tenant_id.cloned(), points_cost)?;

        let sql = format!(
            r#"
            UPDATE feature_costs SET points_cost = $3, updated_at = NOW()
            WHERE feature_key = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_active
            RETURNING {}
            "#,
            FEATURE_COST_COLUMNS
        );
        let updated = sqlx::query_as::<_, FeatureCostRow>(&sql)
            .bind(feature_key)
            .bind(tenant_id.map(TenantId::as_str))
            .bind(points_cost)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to update feature cost", e))?;
        if let Some(row) = updated {
            return FeatureCost::try_from(row);
        }

        sqlx::query(
            r#"
            INSERT INTO feature_costs (
                id, feature_key, tenant_id, points_cost, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(fresh.id.as_uuid())
        .bind(&fresh.feature_key)
        .bind(fresh.tenant_id.as_ref().map(TenantId::as_str))
        .bind(fresh.points_cost)
        .bind(fresh.is_active)
        .bind(fresh.created_at.as_datetime())
        .bind(fresh.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on(
                e,
                "uq_feature_costs_active_pair",
                "Failed to insert feature cost",
                || format!("Concurrent price change for feature '{}'", feature_key),
            )
        })?;
        Ok(fresh)
    }

    async fn disable_feature_cost(&self, id: &FeatureCostId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE feature_costs SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to disable feature cost", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_plan(&self, plan: &SubscriptionPlan) -> Result<(), DomainError> {
        let duration_days = i32::try_from(plan.duration_days).map_err(|_| {
            DomainError::validation("duration_days", "Plan duration does not fit the column")
        })?;
        sqlx::query(
            r#"
            INSERT INTO subscription_plans (id, name, price, monthly_points, duration_days, features)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                monthly_points = EXCLUDED.monthly_points,
                duration_days = EXCLUDED.duration_days,
                features = EXCLUDED.features
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.name)
        .bind(plan.price)
        .bind(plan.monthly_points)
        .bind(duration_days)
        .bind(Json(&plan.features))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save plan", e))?;
        Ok(())
    }

    async fn find_plan(&self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError> {
        let sql = format!("SELECT {} FROM subscription_plans WHERE id = $1", PLAN_COLUMNS);
        let row = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find plan", e))?;
        Ok(row.map(SubscriptionPlan::from))
    }

    async fn find_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find subscription", e))?;
        Ok(row.map(Subscription::from))
    }

    async fn find_subscription_for_plan(
        &self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE account_id = $1 AND plan_id = $2",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(account_id.as_uuid())
            .bind(plan_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find subscription", e))?;
        Ok(row.map(Subscription::from))
    }

    async fn find_task(&self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError> {
        let sql = format!("SELECT {} FROM async_tasks WHERE id = $1", TASK_COLUMNS);
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find task", e))?
            .map(AsyncTask::try_from)
            .transpose()
    }

    async fn claim_task(
        &self,
        id: &TaskId,
        now: Timestamp,
    ) -> Result<Option<AsyncTask>, DomainError> {
        let sql = claim_task_sql();
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .bind(now.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to claim task", e))?
            .map(AsyncTask::try_from)
            .transpose()
    }

    async fn due_task_ids(&self, now: Timestamp, limit: usize) -> Result<Vec<TaskId>, DomainError> {
        let limit = sql_limit(limit);
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM async_tasks
            WHERE status = 'PENDING' AND scheduled_at <= $1
            ORDER BY scheduled_at, created_at
            LIMIT $2
            "#,
        )
        .bind(now.as_datetime())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to select due tasks", e))?;
        Ok(ids.into_iter().map(TaskId::from_uuid).collect())
    }

    async fn stale_task_ids(
        &self,
        started_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<TaskId>, DomainError> {
        let limit = sql_limit(limit);
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM async_tasks
            WHERE status = 'PROCESSING'
              AND (started_at IS NULL OR started_at < $1)
            ORDER BY started_at NULLS FIRST, created_at
            LIMIT $2
            "#,
        )
        .bind(started_before.as_datetime())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to select stale tasks", e))?;
        Ok(ids.into_iter().map(TaskId::from_uuid).collect())
    }

    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM async_tasks
            WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED')
              AND COALESCE(completed_at, updated_at) < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to delete old tasks", e))?;
        Ok(result.rows_affected())
    }
}

/// Unit of work over one Postgres transaction. Dropping it rolls back.
pub struct PostgresLedgerTx {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_account(&mut self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock account", e))?
            .map(Account::try_from)
            .transpose()
    }

    async fn update_account_balance(&mut self, account: &Account) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE accounts SET balance = $2, updated_at = $3 WHERE id = $1")
            .bind(account.id.as_uuid())
            .bind(account.balance)
            .bind(account.updated_at.as_datetime())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to update balance", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::AccountNotFound,
                format!("Account not found: {}", account.id),
            ));
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, account_id, amount, kind, status, description, metadata,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.account_id.as_uuid())
        .bind(transaction.amount)
        .bind(transaction.kind.as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.description)
        .bind(Json(&transaction.metadata))
        .bind(transaction.created_at.as_datetime())
        .bind(transaction.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to insert transaction", e))?;
        Ok(())
    }

    async fn lock_transaction_by_correlation(
        &mut self,
        keys: &CorrelationKeys,
    ) -> Result<Option<Transaction>, DomainError> {
        let Some((checkout_id, request_id)) = correlation_params(keys) else {
            return Ok(None);
        };

        let sql = correlation_lock_sql();
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(checkout_id)
            .bind(request_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to find transaction by correlation", e))?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2, metadata = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.status.as_str())
        .bind(Json(&transaction.metadata))
        .bind(transaction.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to update transaction", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction not found: {}", transaction.id),
            ));
        }
        Ok(())
    }

    async fn latest_month_counter(
        &mut self,
        account_id: &AccountId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<u32>, DomainError> {
        let month: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT (metadata->>'month')::BIGINT FROM transactions
            WHERE account_id = $1
              AND kind = 'EARN'
              AND status = 'COMPLETED'
              AND metadata->>'subscription_id' = $2
              AND metadata->>'month' IS NOT NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(subscription_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to read month counter", e))?;

        month_counter(month.flatten())
    }

    async fn active_feature_costs(
        &mut self,
        feature_key: &str,
    ) -> Result<Vec<FeatureCost>, DomainError> {
        let sql = format!(
            "SELECT {} FROM feature_costs WHERE feature_key = $1 AND is_active ORDER BY created_at",
            FEATURE_COST_COLUMNS
        );
        sqlx::query_as::<_, FeatureCostRow>(&sql)
            .bind(feature_key)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to load feature costs", e))?
            .into_iter()
            .map(FeatureCost::try_from)
            .collect()
    }

    async fn insert_feature_usage(&mut self, usage: &FeatureUsage) -> Result<(), DomainError> {
        let metadata = if usage.metadata.is_null() {
            None
        } else {
            Some(Json(&usage.metadata))
        };
        sqlx::query(
            r#"
            INSERT INTO feature_usages (
                id, account_id, feature_cost_id, points_used, transaction_id, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(usage.id.as_uuid())
        .bind(usage.account_id.as_uuid())
        .bind(usage.feature_cost_id.as_uuid())
        .bind(usage.points_used)
        .bind(usage.transaction_id.as_uuid())
        .bind(metadata)
        .bind(usage.created_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to insert feature usage", e))?;
        Ok(())
    }

    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<SubscriptionPlan>, DomainError> {
        let sql = format!("SELECT {} FROM subscription_plans WHERE id = $1", PLAN_COLUMNS);
        let row = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to find plan", e))?;
        Ok(row.map(SubscriptionPlan::from))
    }

    async fn lock_subscription(
        &mut self,
        account_id: &AccountId,
        plan_id: &PlanId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE account_id = $1 AND plan_id = $2 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(account_id.as_uuid())
            .bind(plan_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock subscription", e))?;
        Ok(row.map(Subscription::from))
    }

    async fn lock_subscription_by_id(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE id = $1 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock subscription", e))?;
        Ok(row.map(Subscription::from))
    }

    async fn upsert_subscription(
        &mut self,
        subscription: &Subscription,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, account_id, plan_id, start_date, end_date, is_active, auto_renew,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ON CONSTRAINT subscriptions_account_plan_key DO UPDATE SET
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                is_active = EXCLUDED.is_active,
                auto_renew = EXCLUDED.auto_renew,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.account_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.start_date.as_datetime())
        .bind(subscription.end_date.as_datetime())
        .bind(subscription.is_active)
        .bind(subscription.auto_renew)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to upsert subscription", e))?;
        Ok(())
    }

    async fn insert_task(&mut self, task: &AsyncTask) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO async_tasks (
                id, account_id, task_type, input, status, attempts, max_attempts, result,
                error, scheduled_at, started_at, completed_at, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.account_id.as_uuid())
        .bind(&task.task_type)
        .bind(Json(&task.input))
        .bind(task.status.as_str())
        .bind(to_i32("attempts", task.attempts)?)
        .bind(to_i32("max_attempts", task.max_attempts)?)
        .bind(task.result.as_ref().map(Json))
        .bind(&task.error)
        .bind(task.scheduled_at.as_datetime())
        .bind(task.started_at.as_ref().map(Timestamp::as_datetime))
        .bind(task.completed_at.as_ref().map(Timestamp::as_datetime))
        .bind(Json(&task.metadata))
        .bind(task.created_at.as_datetime())
        .bind(task.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to insert task", e))?;
        Ok(())
    }

    async fn lock_task(&mut self, id: &TaskId) -> Result<Option<AsyncTask>, DomainError> {
        let sql = format!("SELECT {} FROM async_tasks WHERE id = $1 FOR UPDATE", TASK_COLUMNS);
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock task", e))?
            .map(AsyncTask::try_from)
            .transpose()
    }

    async fn update_task(&mut self, task: &AsyncTask) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE async_tasks SET
                status = $2,
                attempts = $3,
                result = $4,
                error = $5,
                scheduled_at = $6,
                started_at = $7,
                completed_at = $8,
                metadata = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.status.as_str())
        .bind(to_i32("attempts", task.attempts)?)
        .bind(task.result.as_ref().map(Json))
        .bind(&task.error)
        .bind(task.scheduled_at.as_datetime())
        .bind(task.started_at.as_ref().map(Timestamp::as_datetime))
        .bind(task.completed_at.as_ref().map(Timestamp::as_datetime))
        .bind(Json(&task.metadata))
        .bind(task.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database("Failed to update task", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::TaskNotFound,
                format!("Task not found: {}", task.id),
            ));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DomainError::database("Failed to roll back transaction", e))
    }
}

/// Claim is conditional on PENDING so a lost race returns no row.
fn claim_task_sql() -> String {
    format!(
        r#"
        UPDATE async_tasks SET
            status = 'PROCESSING',
            attempts = attempts + 1,
            started_at = $2,
            updated_at = $2
        WHERE id = $1 AND status = 'PENDING' AND scheduled_at <= $2
        RETURNING {}
        "#,
        TASK_COLUMNS
    )
}

/// A pending match wins over newer settled rows.
fn correlation_lock_sql() -> String {
    format!(
        r#"
        SELECT {} FROM transactions
        WHERE metadata->>'checkout_id' = $1 OR metadata->>'request_id' = $2
        ORDER BY (status = 'PENDING') DESC, created_at DESC
        LIMIT 1
        FOR UPDATE
        "#,
        TRANSACTION_COLUMNS
    )
}

/// Non-empty correlation keys as query parameters, or None if there are none.
fn correlation_params(keys: &CorrelationKeys) -> Option<(Option<&str>, Option<&str>)> {
    let checkout_id = keys.checkout_id.as_deref().filter(|s| !s.is_empty());
    let request_id = keys.request_id.as_deref().filter(|s| !s.is_empty());
    if checkout_id.is_none() && request_id.is_none() {
        return None;
    }
    Some((checkout_id, request_id))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn month_counter(raw: Option<i64>) -> Result<Option<u32>, DomainError> {
    raw.map(|m| {
        u32::try_from(m).map_err(|_| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid month counter: {}", m),
            )
        })
    })
    .transpose()
}

/// Maps a violation of `constraint` to Conflict, anything else to a database error.
fn conflict_on(
    err: sqlx::Error,
    constraint: &str,
    context: &str,
    message: impl FnOnce() -> String,
) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(constraint) {
            return DomainError::new(ErrorCode::Conflict, message());
        }
    }
    DomainError::database(context, err)
}
