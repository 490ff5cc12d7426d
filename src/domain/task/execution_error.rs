//! Classification of generation backend failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one execution attempt.
///
/// Retryable failures are transient (network, timeout, 5xx, rate limit).
/// Terminal failures will not improve on retry (bad input, credentials,
/// exhausted quota).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("{message}")]
    Retryable { message: String },

    #[error("{message}")]
    Terminal { message: String },
}

impl ExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ExecutionError::Retryable {
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        ExecutionError::Terminal {
            message: message.into(),
        }
    }

    /// An attempt that exceeded its deadline. Treated like any other
    /// transient failure.
    pub fn timeout(limit: Duration) -> Self {
        Self::retryable(format!("attempt timed out after {}s", limit.as_secs()))
    }

    /// Classifies an HTTP status returned by the generation backend.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.is_empty() {
            format!("backend returned HTTP {}", status)
        } else {
            format!("backend returned HTTP {}: {}", status, body)
        };
        match status {
            408 | 429 | 500..=599 => Self::retryable(message),
            _ => Self::terminal(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Retryable { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutionError::Retryable { message } | ExecutionError::Terminal { message } => {
                message
            }
        }
    }
}
