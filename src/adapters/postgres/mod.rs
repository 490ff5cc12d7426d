//! PostgreSQL adapters - the production system of record.
//!
//! - `PostgresLedgerStore` - `LedgerStore` over a `PgPool`
//! - `PostgresLedgerTx` - one database transaction per unit of work

mod ledger_store;
mod rows;

pub use ledger_store::{connect_pool, PostgresLedgerStore, PostgresLedgerTx};
