//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the ledger and the outside world. Adapters implement these ports.
//!
//! ## Storage
//!
//! - `LedgerStore` / `LedgerTx` - System of record with units of work
//!
//! ## Task execution
//!
//! - `TaskHandler` - Generation backend invoked per task type
//! - `TaskDispatcher` - Hands created or retried tasks to the workers
//!
//! ## External collaborators
//!
//! - `CheckoutProvider` - Payment provider hosted checkout
//! - `NotificationSink` - Fire-and-forget outcome delivery

mod checkout_provider;
mod ledger_store;
mod notification_sink;
mod task_dispatcher;
mod task_handler;

pub use checkout_provider::{CheckoutProvider, CheckoutRequest, CheckoutSession, Purchase};
pub use ledger_store::{LedgerStore, LedgerTx};
pub use notification_sink::{LedgerNotification, NotificationSink};
pub use task_dispatcher::TaskDispatcher;
pub use task_handler::{TaskHandler, TaskHandlerRegistry};
