//! Account aggregate - the owner of a points balance.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, TenantId, Timestamp};

use super::LedgerError;

/// A points account. One per user.
///
/// # Invariants
///
/// - `balance >= 0` after every committed ledger transaction
/// - `balance` only changes through [`Account::credit`] and [`Account::debit`],
///   which the ledger calls while holding the account lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Current spendable points.
    pub balance: i64,

    /// Source site the user registered through, if any.
    pub tenant_id: Option<TenantId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    /// Opens an account with a zero balance.
    pub fn open(id: AccountId, tenant_id: Option<TenantId>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            balance: 0,
            tenant_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the account can pay `amount` points.
    pub fn can_afford(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Adds points and returns the new balance.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is not positive or the balance would overflow.
    pub fn credit(&mut self, amount: i64) -> Result<i64, LedgerError> {
        ensure_positive(amount)?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;
        self.updated_at = Timestamp::now();
        Ok(self.balance)
    }

    /// Removes points and returns the new balance.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `InsufficientBalance` if the balance would go negative; the
    ///   account is left untouched
    pub fn debit(&mut self, amount: i64) -> Result<i64, LedgerError> {
        ensure_positive(amount)?;
        if !self.can_afford(amount) {
            return Err(LedgerError::InsufficientBalance {
                account_id: self.id,
                balance: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        self.updated_at = Timestamp::now();
        Ok(self.balance)
    }
}

pub(super) fn ensure_positive(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}
