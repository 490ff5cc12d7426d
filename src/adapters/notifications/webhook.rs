//! Webhook notification sink.
//!
//! Each notification is POSTed as JSON. When a signing secret is set the
//! request carries `X-Ledger-Signature: t={unix_ts},v1={hex}` where `v1` is
//! HMAC-SHA256 over `"{unix_ts}.{body}"`, the same scheme payment providers
//! use for their own webhooks.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{LedgerNotification, NotificationSink};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Ledger-Signature";

/// Encode bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Delivers notifications to an HTTP endpoint.
pub struct WebhookNotificationSink {
    url: String,
    signing_secret: Option<SecretString>,
    http_client: reqwest::Client,
}

impl WebhookNotificationSink {
    /// Creates a sink with a per-request `timeout`.
    pub fn new(
        url: impl Into<String>,
        signing_secret: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            url: url.into(),
            signing_secret,
            http_client,
        })
    }

    /// Signature header value for `body` at `timestamp`, if a secret is set.
    fn signature(&self, timestamp: i64, body: &str) -> Result<Option<String>, DomainError> {
        let Some(secret) = &self.signing_secret else {
            return Ok(None);
        };
        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        let digest = mac.finalize().into_bytes();
        Ok(Some(format!("t={},v1={}", timestamp, hex_encode(&digest))))
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(&self, notification: &LedgerNotification) -> Result<(), DomainError> {
        let body = serde_json::to_string(notification)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let timestamp = chrono::Utc::now().timestamp();

        let mut request = self
            .http_client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = self.signature(timestamp, &body)? {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body).send().await.map_err(|e| {
            DomainError::new(
                ErrorCode::ExternalServiceError,
                format!("Webhook delivery failed: {}", e),
            )
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DomainError::new(
                ErrorCode::ExternalServiceError,
                format!("Webhook endpoint returned {}: {}", status, error_text),
            ));
        }

        tracing::debug!(
            event = notification.event_type(),
            account_id = %notification.account_id(),
            "Webhook notification delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(secret: Option<&str>) -> WebhookNotificationSink {
        WebhookNotificationSink::new(
            "http://127.0.0.1:9/hooks",
            secret.map(|s| SecretString::new(s.to_string())),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn hex_encode_bytes() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x10]), "00ff10");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn unsigned_without_secret() {
        assert_eq!(sink(None).signature(1704067200, "{}").unwrap(), None);
    }

    #[test]
    fn signature_verifies_with_same_secret() {
        let header = sink(Some("whsec_test")).signature(1704067200, r#"{"a":1}"#).unwrap().unwrap();
        let (ts, sig) = header.split_once(",v1=").unwrap();
        assert_eq!(ts, "t=1704067200");
        assert_eq!(sig.len(), 64);

        let mut mac = HmacSha256::new_from_slice(b"whsec_test").unwrap();
        mac.update(br#"1704067200.{"a":1}"#);
        assert_eq!(hex_encode(&mac.finalize().into_bytes()), sig);
    }

    #[test]
    fn signature_depends_on_timestamp() {
        let s = sink(Some("whsec_test"));
        let a = s.signature(1, "{}").unwrap();
        let b = s.signature(2, "{}").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_external_error() {
        let err = sink(None)
            .notify(&LedgerNotification::TaskCompleted {
                account_id: crate::domain::foundation::AccountId::new(),
                task_id: crate::domain::foundation::TaskId::new(),
                task_type: "image".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
    }
}
