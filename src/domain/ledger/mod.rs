//! Ledger domain - accounts, the transaction trail and its error taxonomy.

mod account;
mod audit;
mod errors;
mod metadata;
mod transaction;

pub use account::Account;
pub use audit::{derive_balance, LedgerAudit};
pub use errors::LedgerError;
pub use metadata::{CorrelationKeys, TransactionMetadata, CHECKOUT_ID_KEY, REQUEST_ID_KEY};
pub use transaction::{BalanceEffect, Transaction, TransactionKind, TransactionStatus};
