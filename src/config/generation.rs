//! Generation backend configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::{is_http_url, ValidationError};

/// HTTP generation backend that executes tasks
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Tasks are posted to `{base_url}/{task_type}`
    pub base_url: String,

    pub api_key: Option<SecretString>,

    /// Comma-separated task types routed to this backend
    #[serde(default = "default_task_types")]
    pub task_types: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn task_types_list(&self) -> Vec<String> {
        self.task_types
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired("GENERATION__BASE_URL"));
        }
        if !is_http_url(&self.base_url) {
            return Err(ValidationError::InvalidUrl("GENERATION__BASE_URL"));
        }
        if self.task_types_list().is_empty() {
            return Err(ValidationError::MissingRequired("GENERATION__TASK_TYPES"));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("GENERATION__TIMEOUT_SECS"));
        }
        Ok(())
    }
}

fn default_task_types() -> String {
    "image,text".to_string()
}

fn default_timeout() -> u64 {
    120
}
