//! Task domain - asynchronous work paid for up front.

mod aggregate;
mod backoff;
mod execution_error;
mod status;

pub use aggregate::{AsyncTask, FailureDisposition, TaskMetadata, MAX_RUNNING_PROGRESS};
pub use backoff::BackoffPolicy;
pub use execution_error::ExecutionError;
pub use status::TaskStatus;
