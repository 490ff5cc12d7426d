//! In-memory notification sink for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{LedgerNotification, NotificationSink};

/// Records notifications and can be told to fail.
///
/// # Example
///
/// ```ignore
/// let sink = RecordingNotificationSink::new();
/// sink.fail_deliveries(true);
/// // ... run a handler; it must still succeed
/// assert!(sink.notifications().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationSink {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    delivered: Vec<LedgerNotification>,
    failing: bool,
    attempts: usize,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery return an error.
    pub fn fail_deliveries(&self, failing: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing = failing;
        }
    }

    /// Successfully delivered notifications, oldest first.
    pub fn notifications(&self) -> Vec<LedgerNotification> {
        self.inner
            .lock()
            .map(|state| state.delivered.clone())
            .unwrap_or_default()
    }

    /// Delivery attempts including failed ones.
    pub fn attempts(&self) -> usize {
        self.inner.lock().map(|state| state.attempts).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: &LedgerNotification) -> Result<(), DomainError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "Sink state poisoned"))?;
        state.attempts += 1;
        if state.failing {
            return Err(DomainError::new(
                ErrorCode::ExternalServiceError,
                "Notification delivery refused",
            ));
        }
        state.delivered.push(notification.clone());
        Ok(())
    }
}
