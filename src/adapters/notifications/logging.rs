//! Tracing-backed notification sink.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{LedgerNotification, NotificationSink};

/// Emits every notification as a structured `info` event.
///
/// Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationSink;

impl LoggingNotificationSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, notification: &LedgerNotification) -> Result<(), DomainError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        tracing::info!(
            event = notification.event_type(),
            account_id = %notification.account_id(),
            payload = %payload,
            "Ledger notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AccountId, TaskId};

    #[tokio::test]
    async fn logging_sink_always_succeeds() {
        let sink = LoggingNotificationSink::new();
        let result = sink
            .notify(&LedgerNotification::TaskCompleted {
                account_id: AccountId::new(),
                task_id: TaskId::new(),
                task_type: "image".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}
