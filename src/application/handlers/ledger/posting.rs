//! The balance-mutation primitive shared by every ledger-changing handler.
//!
//! Runs inside a caller-owned [`LedgerTx`], so the balance write and its
//! audit row commit or roll back together with whatever else the caller does.

use crate::domain::foundation::AccountId;
use crate::domain::ledger::{Account, BalanceEffect, LedgerError, Transaction};
use crate::ports::LedgerTx;

/// Locks `account_id` for the rest of the transaction.
pub(crate) async fn lock_account(
    tx: &mut dyn LedgerTx,
    account_id: AccountId,
) -> Result<Account, LedgerError> {
    tx.lock_account(&account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))
}

/// Applies a COMPLETED credit or debit row to a locked account.
///
/// The account is mutated in memory first; nothing is written if the
/// debit would overdraw.
pub(crate) async fn post_transaction(
    tx: &mut dyn LedgerTx,
    account: &mut Account,
    transaction: &Transaction,
) -> Result<i64, LedgerError> {
    if transaction.account_id != account.id {
        return Err(LedgerError::infrastructure(format!(
            "Transaction {} belongs to account {}, not {}",
            transaction.id, transaction.account_id, account.id
        )));
    }

    let new_balance = match transaction.kind.effect() {
        BalanceEffect::Credit => account.credit(transaction.amount)?,
        BalanceEffect::Debit => account.debit(transaction.amount)?,
        BalanceEffect::None => return Err(LedgerError::UnsupportedKind(transaction.kind)),
    };

    tx.update_account_balance(account).await?;
    tx.insert_transaction(transaction).await?;
    Ok(new_balance)
}
