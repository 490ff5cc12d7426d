//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations over the
//! `LedgerStore` port, grouped by module.

pub mod features;
pub mod ledger;
pub mod payments;
pub mod tasks;

pub use features::{UseFeatureCommand, UseFeatureHandler, UseFeatureResult};
pub use ledger::{
    ApplyDeltaCommand, ApplyDeltaHandler, ApplyDeltaResult, AuditAccountHandler,
    AuditAccountQuery, ListTransactionsHandler, ListTransactionsQuery, RefundCommand,
    RefundHandler, RefundResult,
};
pub use payments::{
    ConfirmationOutcome, HandleConfirmationCommand, HandleConfirmationHandler,
    HandleRecurringChargeCommand, HandleRecurringChargeHandler, ReconcileOutcome,
    StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult,
};
pub use tasks::{
    CancelTaskCommand, CancelTaskHandler, CleanupOldHandler, CreateTaskCommand,
    CreateTaskHandler, CreateTaskResult, ExecuteTaskHandler, ExecuteTaskResult,
    GetTaskStatusHandler, GetTaskStatusQuery, ProcessPendingHandler, ReclaimStaleHandler,
    RefundTaskCommand, RefundTaskHandler, RefundTaskResult, TaskStatusView,
};
