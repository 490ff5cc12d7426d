//! Balance audit - recomputes a balance from the transaction trail.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::AccountId;

use super::Transaction;

/// Result of comparing a stored balance with its transaction trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub account_id: AccountId,
    pub balance: i64,
    pub derived_balance: i64,
    pub completed_transactions: usize,
}

impl LedgerAudit {
    pub fn of(account_id: AccountId, balance: i64, transactions: &[Transaction]) -> Self {
        Self {
            account_id,
            balance,
            derived_balance: derive_balance(transactions),
            completed_transactions: transactions
                .iter()
                .filter(|t| t.status == super::TransactionStatus::Completed)
                .count(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.balance == self.derived_balance && self.balance >= 0
    }
}

/// Signed sum of COMPLETED transactions.
pub fn derive_balance(transactions: &[Transaction]) -> i64 {
    transactions.iter().map(Transaction::signed_amount).sum()
}
