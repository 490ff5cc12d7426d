//! Best-effort notification delivery.

use crate::ports::{LedgerNotification, NotificationSink};

/// Pushes `notification` to `sink`, logging instead of failing.
///
/// Called only after the ledger change it describes has committed.
pub(crate) async fn notify_best_effort(sink: &dyn NotificationSink, notification: LedgerNotification) {
    if let Err(e) = sink.notify(&notification).await {
        tracing::warn!(
            event = notification.event_type(),
            account_id = %notification.account_id(),
            error = %e,
            "Notification delivery failed"
        );
    }
}
