//! Ledger handlers.
//!
//! ## Commands
//! - Apply a credit or debit
//! - Refund after failed downstream work
//!
//! ## Queries
//! - Audit a balance against its transaction trail
//! - List transaction history

mod apply_delta;
mod audit_account;
mod list_transactions;
mod posting;
mod refund;

// Commands
pub use apply_delta::{ApplyDeltaCommand, ApplyDeltaHandler, ApplyDeltaResult};
pub use refund::{RefundCommand, RefundHandler, RefundResult};

// Queries
pub use audit_account::{AuditAccountHandler, AuditAccountQuery};
pub use list_transactions::{ListTransactionsHandler, ListTransactionsQuery};

pub(crate) use posting::{lock_account, post_transaction};
