//! Ledger transaction - the append-mostly audit record.
//!
//! Every balance change is explained by exactly one COMPLETED transaction.
//! PENDING rows describe money requested from the payment provider and do not
//! count towards the balance until the reconciler completes them.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, StateMachine, Timestamp, TransactionId};

use super::{LedgerError, TransactionMetadata};

/// What a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Points bought with a one-off payment.
    Topup,
    /// Points spent on a feature or task.
    Redeem,
    /// Subscription billing record; the points come from the paired EARN row.
    Subscription,
    /// Points returned after failed downstream work.
    Refund,
    /// Points granted (e.g. monthly subscription allowance).
    Earn,
    /// Points removed because they lapsed.
    Expire,
}

/// How a kind affects the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    Credit,
    Debit,
    None,
}

impl TransactionKind {
    pub fn effect(&self) -> BalanceEffect {
        match self {
            TransactionKind::Topup | TransactionKind::Refund | TransactionKind::Earn => {
                BalanceEffect::Credit
            }
            TransactionKind::Redeem | TransactionKind::Expire => BalanceEffect::Debit,
            TransactionKind::Subscription => BalanceEffect::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Topup => "TOPUP",
            TransactionKind::Redeem => "REDEEM",
            TransactionKind::Subscription => "SUBSCRIPTION",
            TransactionKind::Refund => "REFUND",
            TransactionKind::Earn => "EARN",
            TransactionKind::Expire => "EXPIRE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TOPUP" => Some(TransactionKind::Topup),
            "REDEEM" => Some(TransactionKind::Redeem),
            "SUBSCRIPTION" => Some(TransactionKind::Subscription),
            "REFUND" => Some(TransactionKind::Refund),
            "EARN" => Some(TransactionKind::Earn),
            "EXPIRE" => Some(TransactionKind::Expire),
            _ => None,
        }
    }
}

/// Lifecycle of a transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            "CANCELLED" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

impl StateMachine for TransactionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, target),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TransactionStatus::*;
        match self {
            Pending => vec![Completed, Failed, Cancelled],
            Completed | Failed | Cancelled => vec![],
        }
    }
}

/// A row in the transaction ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    /// Unsigned point amount; the sign comes from `kind`.
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub description: String,
    pub metadata: TransactionMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Transaction {
    /// Builds a COMPLETED row documenting an applied balance change.
    pub fn completed(
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: impl Into<String>,
        metadata: TransactionMetadata,
    ) -> Self {
        Self::build(account_id, amount, kind, TransactionStatus::Completed, description, metadata)
    }

    /// Builds a PENDING row awaiting external payment confirmation.
    ///
    /// Only TOPUP and SUBSCRIPTION are paid for externally.
    pub fn pending(
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: impl Into<String>,
        metadata: TransactionMetadata,
    ) -> Result<Self, LedgerError> {
        if !matches!(kind, TransactionKind::Topup | TransactionKind::Subscription) {
            return Err(LedgerError::UnsupportedKind(kind));
        }
        super::account::ensure_positive(amount)?;
        Ok(Self::build(
            account_id,
            amount,
            kind,
            TransactionStatus::Pending,
            description,
            metadata,
        ))
    }

    fn build(
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        status: TransactionStatus,
        description: impl Into<String>,
        metadata: TransactionMetadata,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: TransactionId::new(),
            account_id,
            amount,
            kind,
            status,
            description: description.into(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Contribution of this row to the account balance.
    ///
    /// Only COMPLETED rows count; SUBSCRIPTION rows never do.
    pub fn signed_amount(&self) -> i64 {
        if self.status != TransactionStatus::Completed {
            return 0;
        }
        match self.kind.effect() {
            BalanceEffect::Credit => self.amount,
            BalanceEffect::Debit => -self.amount,
            BalanceEffect::None => 0,
        }
    }

    /// Moves the row to a terminal status.
    pub fn settle(&mut self, status: TransactionStatus) -> Result<(), LedgerError> {
        self.status = self.status.transition_to(status).map_err(|e| {
            LedgerError::invalid_state(self.status.as_str(), e.to_string())
        })?;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_topup() -> Transaction {
        Transaction::pending(
            AccountId::new(),
            100,
            TransactionKind::Topup,
            "Top-up 100 points",
            TransactionMetadata::new().with_checkout_id("cs_1"),
        )
        .unwrap()
    }

    #[test]
    fn kind_effects_match_ledger_rules() {
        assert_eq!(TransactionKind::Topup.effect(), BalanceEffect::Credit);
        assert_eq!(TransactionKind::Refund.effect(), BalanceEffect::Credit);
        assert_eq!(TransactionKind::Earn.effect(), BalanceEffect::Credit);
        assert_eq!(TransactionKind::Redeem.effect(), BalanceEffect::Debit);
        assert_eq!(TransactionKind::Expire.effect(), BalanceEffect::Debit);
        assert_eq!(TransactionKind::Subscription.effect(), BalanceEffect::None);
    }

    #[test]
    fn kind_and_status_strings_parse_back() {
        for kind in [
            TransactionKind::Topup,
            TransactionKind::Redeem,
            TransactionKind::Subscription,
            TransactionKind::Refund,
            TransactionKind::Earn,
            TransactionKind::Expire,
        ] {
            assert_eq!(TransactionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionStatus::parse("cancelled"), Some(TransactionStatus::Cancelled));
        assert_eq!(TransactionStatus::parse("settled"), None);
    }

    #[test]
    fn pending_rows_do_not_count() {
        assert_eq!(pending_topup().signed_amount(), 0);
    }

    #[test]
    fn completed_rows_are_signed_by_kind() {
        let account = AccountId::new();
        let meta = TransactionMetadata::new;
        assert_eq!(
            Transaction::completed(account, 7, TransactionKind::Earn, "", meta()).signed_amount(),
            7
        );
        assert_eq!(
            Transaction::completed(account, 3, TransactionKind::Redeem, "", meta()).signed_amount(),
            -3
        );
        assert_eq!(
            Transaction::completed(account, 9, TransactionKind::Subscription, "", meta())
                .signed_amount(),
            0
        );
    }

    #[test]
    fn only_paid_kinds_may_be_pending() {
        let result = Transaction::pending(
            AccountId::new(),
            5,
            TransactionKind::Redeem,
            "",
            TransactionMetadata::new(),
        );
        assert!(matches!(result, Err(LedgerError::UnsupportedKind(TransactionKind::Redeem))));
    }

    #[test]
    fn settle_completes_pending_once() {
        let mut tx = pending_topup();
        tx.settle(TransactionStatus::Completed).unwrap();
        assert_eq!(tx.signed_amount(), 100);
        assert!(tx.settle(TransactionStatus::Completed).is_err());
        assert!(tx.settle(TransactionStatus::Failed).is_err());
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }
}
