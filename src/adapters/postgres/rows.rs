//! Row types and column mappings shared by the Postgres ledger adapter.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, FeatureCostId, PlanId, SubscriptionId, TaskId, TenantId,
    Timestamp, TransactionId, UsageId,
};
use crate::domain::ledger::{Account, Transaction, TransactionKind, TransactionMetadata, TransactionStatus};
use crate::domain::pricing::{FeatureCost, FeatureUsage};
use crate::domain::subscription::{Subscription, SubscriptionPlan};
use crate::domain::task::{AsyncTask, TaskMetadata, TaskStatus};

pub(super) const ACCOUNT_COLUMNS: &str = "id, balance, tenant_id, created_at, updated_at";

pub(super) const TRANSACTION_COLUMNS: &str =
    "id, account_id, amount, kind, status, description, metadata, created_at, updated_at";

pub(super) const FEATURE_COST_COLUMNS: &str =
    "id, feature_key, tenant_id, points_cost, is_active, created_at, updated_at";

pub(super) const FEATURE_USAGE_COLUMNS: &str =
    "id, account_id, feature_cost_id, points_used, transaction_id, metadata, created_at";

pub(super) const PLAN_COLUMNS: &str = "id, name, price, monthly_points, duration_days, features";

pub(super) const SUBSCRIPTION_COLUMNS: &str =
    "id, account_id, plan_id, start_date, end_date, is_active, auto_renew, created_at, updated_at";

pub(super) const TASK_COLUMNS: &str = "id, account_id, task_type, input, status, attempts, \
     max_attempts, result, error, scheduled_at, started_at, completed_at, metadata, created_at, \
     updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(super) struct AccountRow {
    id: Uuid,
    balance: i64,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId::from_uuid(row.id),
            balance: row.balance,
            tenant_id: parse_tenant(row.tenant_id)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    amount: i64,
    kind: String,
    status: String,
    description: String,
    metadata: Json<TransactionMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            amount: row.amount,
            kind: TransactionKind::parse(&row.kind).ok_or_else(|| invalid_value("kind", &row.kind))?,
            status: TransactionStatus::parse(&row.status)
                .ok_or_else(|| invalid_value("status", &row.status))?,
            description: row.description,
            metadata: row.metadata.0,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct FeatureCostRow {
    id: Uuid,
    feature_key: String,
    tenant_id: Option<String>,
    points_cost: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FeatureCostRow> for FeatureCost {
    type Error = DomainError;

    fn try_from(row: FeatureCostRow) -> Result<Self, Self::Error> {
        Ok(FeatureCost {
            id: FeatureCostId::from_uuid(row.id),
            feature_key: row.feature_key,
            tenant_id: parse_tenant(row.tenant_id)?,
            points_cost: row.points_cost,
            is_active: row.is_active,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct FeatureUsageRow {
    id: Uuid,
    account_id: Uuid,
    feature_cost_id: Uuid,
    points_used: i64,
    transaction_id: Uuid,
    metadata: Option<Json<JsonValue>>,
    created_at: DateTime<Utc>,
}

impl From<FeatureUsageRow> for FeatureUsage {
    fn from(row: FeatureUsageRow) -> Self {
        FeatureUsage {
            id: UsageId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            feature_cost_id: FeatureCostId::from_uuid(row.feature_cost_id),
            points_used: row.points_used,
            transaction_id: TransactionId::from_uuid(row.transaction_id),
            metadata: row.metadata.map(|m| m.0).unwrap_or(JsonValue::Null),
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PlanRow {
    id: Uuid,
    name: String,
    price: i64,
    monthly_points: i64,
    duration_days: i32,
    features: Json<Vec<String>>,
}

impl From<PlanRow> for SubscriptionPlan {
    fn from(row: PlanRow) -> Self {
        SubscriptionPlan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            price: row.price,
            monthly_points: row.monthly_points,
            duration_days: i64::from(row.duration_days),
            features: row.features.0,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    account_id: Uuid,
    plan_id: Uuid,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    is_active: bool,
    auto_renew: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: SubscriptionId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            start_date: Timestamp::from_datetime(row.start_date),
            end_date: Timestamp::from_datetime(row.end_date),
            is_active: row.is_active,
            auto_renew: row.auto_renew,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TaskRow {
    id: Uuid,
    account_id: Uuid,
    task_type: String,
    input: Json<JsonValue>,
    status: String,
    attempts: i32,
    max_attempts: i32,
    result: Option<Json<JsonValue>>,
    error: Option<String>,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    metadata: Json<TaskMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for AsyncTask {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(AsyncTask {
            id: TaskId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            task_type: row.task_type,
            input: row.input.0,
            status: TaskStatus::parse(&row.status)
                .ok_or_else(|| invalid_value("status", &row.status))?,
            attempts: to_u32("attempts", row.attempts)?,
            max_attempts: to_u32("max_attempts", row.max_attempts)?,
            result: row.result.map(|r| r.0),
            error: row.error,
            scheduled_at: Timestamp::from_datetime(row.scheduled_at),
            started_at: row.started_at.map(Timestamp::from_datetime),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
            metadata: row.metadata.0,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Converts a domain counter to the INTEGER column type.
pub(super) fn to_i32(field: &str, value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| invalid_value(field, &value.to_string()))
}

fn to_u32(field: &str, value: i32) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| invalid_value(field, &value.to_string()))
}

fn parse_tenant(value: Option<String>) -> Result<Option<TenantId>, DomainError> {
    value
        .map(|t| TenantId::new(t).map_err(|e| invalid_value("tenant_id", &e.to_string())))
        .transpose()
}

fn invalid_value(field: &str, value: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", field, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn transaction_row_maps_kind_and_status() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount: 250,
            kind: "EARN".to_string(),
            status: "COMPLETED".to_string(),
            description: "Month 1 grant".to_string(),
            metadata: Json(TransactionMetadata::new().with_month(1)),
            created_at: now(),
            updated_at: now(),
        };
        let tx = Transaction::try_from(row).unwrap();
        assert_eq!(tx.kind, TransactionKind::Earn);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.metadata.month, Some(1));
    }

    #[test]
    fn unknown_kind_is_a_database_error() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount: 1,
            kind: "GIFT".to_string(),
            status: "COMPLETED".to_string(),
            description: String::new(),
            metadata: Json(TransactionMetadata::new()),
            created_at: now(),
            updated_at: now(),
        };
        let err = Transaction::try_from(row).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("GIFT"));
    }

    #[test]
    fn task_row_rejects_negative_attempts() {
        let row = TaskRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            task_type: "image".to_string(),
            input: Json(json!({})),
            status: "PENDING".to_string(),
            attempts: -1,
            max_attempts: 3,
            result: None,
            error: None,
            scheduled_at: now(),
            started_at: None,
            completed_at: None,
            metadata: Json(TaskMetadata::charged(3, TransactionId::new())),
            created_at: now(),
            updated_at: now(),
        };
        assert!(AsyncTask::try_from(row).is_err());
    }

    #[test]
    fn blank_tenant_in_row_is_rejected() {
        let row = AccountRow {
            id: Uuid::new_v4(),
            balance: 0,
            tenant_id: Some("  ".to_string()),
            created_at: now(),
            updated_at: now(),
        };
        assert!(Account::try_from(row).is_err());
    }

    #[test]
    fn plan_row_widens_duration() {
        let row = PlanRow {
            id: Uuid::new_v4(),
            name: "Pro".to_string(),
            price: 1999,
            monthly_points: 250,
            duration_days: 30,
            features: Json(vec!["hd".to_string()]),
        };
        let plan = SubscriptionPlan::from(row);
        assert_eq!(plan.duration_days, 30);
        assert_eq!(plan.features, vec!["hd".to_string()]);
    }
}
