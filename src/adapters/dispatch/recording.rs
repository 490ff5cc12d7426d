//! Dispatcher that only records calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, TaskId};
use crate::ports::TaskDispatcher;

/// One recorded dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub task_id: TaskId,
    pub delay: Duration,
}

/// Keeps every dispatch so tests can drive execution by hand.
#[derive(Debug, Clone, Default)]
pub struct RecordingTaskDispatcher {
    calls: Arc<Mutex<Vec<Dispatch>>>,
}

impl RecordingTaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Dispatch> {
        self.calls.lock().ok().and_then(|c| c.last().copied())
    }
}

#[async_trait]
impl TaskDispatcher for RecordingTaskDispatcher {
    async fn dispatch(&self, task_id: TaskId, delay: Duration) -> Result<(), DomainError> {
        self.calls
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "Dispatcher state poisoned"))?
            .push(Dispatch { task_id, delay });
        Ok(())
    }
}
