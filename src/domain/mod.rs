//! Domain layer containing the ledger rules and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, state machine, errors)
//! - `ledger` - Accounts, transactions and the ledger error taxonomy
//! - `pricing` - Feature price list and usage records
//! - `subscription` - Plans and per-account subscriptions
//! - `task` - Asynchronous tasks, retry policy and failure classification

pub mod foundation;
pub mod ledger;
pub mod pricing;
pub mod subscription;
pub mod task;
