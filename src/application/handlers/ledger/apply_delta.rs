//! ApplyDeltaHandler - Credit or debit an account with an audit row.

use std::sync::Arc;

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{
    LedgerError, Transaction, TransactionKind, TransactionMetadata,
};
use crate::ports::LedgerStore;

use super::posting::{lock_account, post_transaction};

/// Command to change a balance.
#[derive(Debug, Clone)]
pub struct ApplyDeltaCommand {
    pub account_id: AccountId,
    /// Positive; the sign comes from `kind`.
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub metadata: TransactionMetadata,
}

impl ApplyDeltaCommand {
    pub fn new(account_id: AccountId, amount: i64, kind: TransactionKind) -> Self {
        Self {
            account_id,
            amount,
            kind,
            description: String::new(),
            metadata: TransactionMetadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: TransactionMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of a committed balance change.
#[derive(Debug, Clone)]
pub struct ApplyDeltaResult {
    pub new_balance: i64,
    pub transaction: Transaction,
}

/// Handler for direct balance changes.
///
/// SUBSCRIPTION is rejected: it is billing information recorded by the
/// reconciler, never a balance change.
pub struct ApplyDeltaHandler {
    store: Arc<dyn LedgerStore>,
}

impl ApplyDeltaHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: ApplyDeltaCommand) -> Result<ApplyDeltaResult, LedgerError> {
        if cmd.kind == TransactionKind::Subscription {
            return Err(LedgerError::UnsupportedKind(cmd.kind));
        }
        if cmd.amount <= 0 {
            return Err(LedgerError::InvalidAmount(cmd.amount));
        }

        let transaction = Transaction::completed(
            cmd.account_id,
            cmd.amount,
            cmd.kind,
            cmd.description,
            cmd.metadata,
        );

        let mut tx = self.store.begin().await?;
        let mut account = lock_account(tx.as_mut(), cmd.account_id).await?;
        let new_balance = post_transaction(tx.as_mut(), &mut account, &transaction).await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %cmd.account_id,
            transaction_id = %transaction.id,
            kind = transaction.kind.as_str(),
            amount = transaction.amount,
            new_balance,
            "Ledger delta applied"
        );

        Ok(ApplyDeltaResult {
            new_balance,
            transaction,
        })
    }
}
