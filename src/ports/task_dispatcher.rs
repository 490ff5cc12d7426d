//! Task dispatch port.
//!
//! Dispatch is an optimization: a task that is never delivered is still
//! picked up by the periodic sweep because its PENDING row remains.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TaskId};

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Schedules `task_id` for execution once `delay` has elapsed.
    /// Must not block on the execution itself.
    async fn dispatch(&self, task_id: TaskId, delay: Duration) -> Result<(), DomainError>;
}
