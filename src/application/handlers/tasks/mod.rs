//! Async task handlers.
//!
//! ## Commands
//! - Create a task (pre-debit + enqueue)
//! - Execute one attempt
//! - Cancel a PENDING task
//! - Refund a FAILED or CANCELLED task
//! - Sweep due tasks, reclaim stale attempts, clean up old ones
//!
//! ## Queries
//! - Task status with progress estimate

mod cancel_task;
mod cleanup_old;
mod create_task;
mod execute_task;
mod get_task_status;
mod process_pending;
mod reclaim_stale;
mod refund_task;

// Commands
pub use cancel_task::{CancelTaskCommand, CancelTaskHandler};
pub use cleanup_old::CleanupOldHandler;
pub use create_task::{CreateTaskCommand, CreateTaskHandler, CreateTaskResult};
pub use execute_task::{ExecuteTaskHandler, ExecuteTaskResult};
pub use process_pending::ProcessPendingHandler;
pub use reclaim_stale::ReclaimStaleHandler;
pub use refund_task::{RefundTaskCommand, RefundTaskHandler, RefundTaskResult};

// Queries
pub use get_task_status::{GetTaskStatusHandler, GetTaskStatusQuery, TaskStatusView};
