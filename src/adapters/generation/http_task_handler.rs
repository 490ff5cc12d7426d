//! HTTP generation backend.
//!
//! `POST {base_url}/{task_type}` with the task input as the JSON body. A 2xx
//! response body becomes the task result. Failures are classified for the
//! retry policy: connection errors, timeouts, 408, 429 and 5xx are
//! retryable; everything else is terminal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::task::ExecutionError;
use crate::ports::TaskHandler;

/// Connection settings for the generation service.
#[derive(Debug, Clone)]
pub struct HttpTaskHandlerConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl HttpTaskHandlerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `TaskHandler` backed by an HTTP service.
pub struct HttpTaskHandler {
    config: HttpTaskHandlerConfig,
    client: Client,
}

impl HttpTaskHandler {
    pub fn new(config: HttpTaskHandlerConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;
        Ok(Self { config, client })
    }

    fn task_url(&self, task_type: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), task_type)
    }

    fn classify_send_error(&self, e: reqwest::Error) -> ExecutionError {
        if e.is_timeout() {
            ExecutionError::timeout(self.config.timeout)
        } else if e.is_connect() {
            ExecutionError::retryable(format!("Connection failed: {}", e))
        } else {
            ExecutionError::retryable(e.to_string())
        }
    }
}

#[async_trait]
impl TaskHandler for HttpTaskHandler {
    async fn invoke(&self, task_type: &str, input: &JsonValue) -> Result<JsonValue, ExecutionError> {
        let mut request = self
            .client
            .post(self.task_url(task_type))
            .header("Content-Type", "application/json")
            .json(input);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::from_http_status(status.as_u16(), error_body));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| ExecutionError::terminal(format!("Malformed backend response: {}", e)))
    }
}
