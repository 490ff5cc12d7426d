//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the ledger to external systems:
//! - `postgres` - Production `LedgerStore`
//! - `memory` - In-process `LedgerStore` for tests and local runs
//! - `dispatch` - Task hand-off to the worker supervisor
//! - `generation` - HTTP generation backend
//! - `checkout` - Checkout provider mock
//! - `notifications` - Outcome delivery (tracing, signed webhook)

pub mod checkout;
pub mod dispatch;
pub mod generation;
pub mod memory;
pub mod notifications;
pub mod postgres;

pub use checkout::MockCheckoutProvider;
pub use dispatch::{ChannelTaskDispatcher, DispatchReceiver, RecordingTaskDispatcher};
pub use generation::{HttpTaskHandler, HttpTaskHandlerConfig};
pub use memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use notifications::{LoggingNotificationSink, RecordingNotificationSink, WebhookNotificationSink};
pub use postgres::{connect_pool, PostgresLedgerStore};
