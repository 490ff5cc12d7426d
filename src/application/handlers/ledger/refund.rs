//! RefundHandler - Compensating REFUND credit.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{LedgerError, Transaction, TransactionKind, TransactionMetadata};
use crate::ports::LedgerStore;

use super::posting::{lock_account, post_transaction};

/// Command to return points after downstream work failed.
#[derive(Debug, Clone)]
pub struct RefundCommand {
    pub account_id: AccountId,
    pub amount: i64,
    pub reason: String,
    /// Extra correlation data kept on the REFUND row.
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct RefundResult {
    pub new_balance: i64,
    pub transaction: Transaction,
}

/// Handler for explicit refunds.
///
/// Refunds are never automatic. The caller decides that a charge should be
/// compensated and is responsible for not asking twice; task refunds go
/// through `RefundTaskHandler`, which records the refund on the task.
pub struct RefundHandler {
    store: Arc<dyn LedgerStore>,
}

impl RefundHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: RefundCommand) -> Result<RefundResult, LedgerError> {
        if cmd.reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "Refund reason is required"));
        }
        if cmd.amount <= 0 {
            return Err(LedgerError::InvalidAmount(cmd.amount));
        }

        let transaction = Transaction::completed(
            cmd.account_id,
            cmd.amount,
            TransactionKind::Refund,
            cmd.reason,
            TransactionMetadata::new().merge_extra(cmd.metadata),
        );

        let mut tx = self.store.begin().await?;
        let mut account = lock_account(tx.as_mut(), cmd.account_id).await?;
        let new_balance = post_transaction(tx.as_mut(), &mut account, &transaction).await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %cmd.account_id,
            transaction_id = %transaction.id,
            amount = transaction.amount,
            new_balance,
            "Refund credited"
        );

        Ok(RefundResult {
            new_balance,
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::domain::ledger::Account;
    use serde_json::json;

    #[tokio::test]
    async fn refund_credits_with_reason_and_metadata() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = AccountId::new();
        store.create_account(&Account::open(id, None)).await.unwrap();

        let result = RefundHandler::new(store.clone())
            .handle(RefundCommand {
                account_id: id,
                amount: 3,
                reason: "model call failed".to_string(),
                metadata: Some(json!({ "request": "abc" })),
            })
            .await
            .unwrap();

        assert_eq!(result.new_balance, 3);
        assert_eq!(result.transaction.kind, TransactionKind::Refund);
        assert_eq!(result.transaction.description, "model call failed");
        assert_eq!(result.transaction.metadata.extra["request"], json!("abc"));
    }

    #[tokio::test]
    async fn blank_reason_is_rejected() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let err = RefundHandler::new(store)
            .handle(RefundCommand {
                account_id: AccountId::new(),
                amount: 3,
                reason: " ".to_string(),
                metadata: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }
}
