//! Channel-backed dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::foundation::{DomainError, ErrorCode, TaskId};
use crate::ports::TaskDispatcher;

/// Receiving half consumed by the supervisor.
pub type DispatchReceiver = mpsc::Receiver<TaskId>;

/// Sends task ids over a bounded channel.
///
/// Delayed dispatches sleep on a detached tokio task. A full channel drops
/// the id with a warning; the task row stays PENDING and the sweep picks
/// it up.
#[derive(Debug, Clone)]
pub struct ChannelTaskDispatcher {
    sender: mpsc::Sender<TaskId>,
}

impl ChannelTaskDispatcher {
    /// Creates a dispatcher and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, DispatchReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    fn send_now(sender: &mpsc::Sender<TaskId>, task_id: TaskId) -> Result<(), DomainError> {
        match sender.try_send(task_id) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(task_id = %task_id, "Dispatch channel full, leaving task to the sweep");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(DomainError::new(
                ErrorCode::InternalError,
                "Dispatch channel closed",
            )),
        }
    }
}

#[async_trait]
impl TaskDispatcher for ChannelTaskDispatcher {
    async fn dispatch(&self, task_id: TaskId, delay: Duration) -> Result<(), DomainError> {
        if delay.is_zero() {
            return Self::send_now(&self.sender, task_id);
        }

        if self.sender.is_closed() {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "Dispatch channel closed",
            ));
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = Self::send_now(&sender, task_id) {
                tracing::debug!(task_id = %task_id, error = %e, "Delayed dispatch dropped");
            }
        });
        Ok(())
    }
}
