//! Notification sink configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::{is_http_url, ValidationError};

/// Outcome delivery settings.
///
/// Without a `webhook_url` notifications are only logged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,

    /// HMAC key for the `X-Ledger-Signature` header
    pub signing_secret: Option<SecretString>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl NotificationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.webhook_url {
            if !is_http_url(url) {
                return Err(ValidationError::InvalidUrl("NOTIFICATIONS__WEBHOOK_URL"));
            }
            if self.timeout_secs == 0 {
                return Err(ValidationError::InvalidTimeout("NOTIFICATIONS__TIMEOUT_SECS"));
            }
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    5
}
