//! In-process adapters for tests and single-process development.

mod ledger_store;

pub use ledger_store::{InMemoryLedgerStore, InMemoryLedgerTx};
