//! Notification sink adapters.
//!
//! - `LoggingNotificationSink` - writes outcomes to the tracing pipeline
//! - `WebhookNotificationSink` - POSTs HMAC-signed JSON to a URL
//! - `RecordingNotificationSink` - keeps outcomes in memory for tests

mod logging;
mod recording;
mod webhook;

pub use logging::LoggingNotificationSink;
pub use recording::RecordingNotificationSink;
pub use webhook::{hex_encode, WebhookNotificationSink, SIGNATURE_HEADER};
