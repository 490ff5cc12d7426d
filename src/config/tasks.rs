//! Async task engine configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::task::BackoffPolicy;

/// Retry, timeout and worker settings for task execution
#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    /// Used when `CreateTask` does not name one
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// Deadline for one generation backend call
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Terminal tasks older than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Used for the progress estimate only
    #[serde(default = "default_expected_duration")]
    pub expected_duration_secs: u64,

    /// Slack past the attempt timeout before a PROCESSING task is reclaimed
    #[serde(default = "default_stale_grace")]
    pub stale_grace_secs: u64,
}

impl TasksConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs(self.expected_duration_secs)
    }

    /// Age after which a PROCESSING attempt is presumed abandoned.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.saturating_add(self.stale_grace_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=100).contains(&self.default_max_attempts) {
            return Err(ValidationError::InvalidTaskSetting("default_max_attempts"));
        }
        if self.backoff_base_secs > self.backoff_max_secs {
            return Err(ValidationError::InvalidBackoff);
        }
        if self.attempt_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("TASKS__ATTEMPT_TIMEOUT_SECS"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidTaskSetting("sweep_interval_secs"));
        }
        if self.sweep_batch_size == 0 {
            return Err(ValidationError::InvalidTaskSetting("sweep_batch_size"));
        }
        if self.worker_concurrency == 0 {
            return Err(ValidationError::InvalidTaskSetting("worker_concurrency"));
        }
        if self.retention_days == 0 {
            return Err(ValidationError::InvalidTaskSetting("retention_days"));
        }
        Ok(())
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            attempt_timeout_secs: default_attempt_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch_size(),
            worker_concurrency: default_worker_concurrency(),
            retention_days: default_retention_days(),
            expected_duration_secs: default_expected_duration(),
            stale_grace_secs: default_stale_grace(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    300
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_sweep_batch_size() -> usize {
    50
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_retention_days() -> u32 {
    30
}

fn default_expected_duration() -> u64 {
    60
}

fn default_stale_grace() -> u64 {
    60
}
