//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `POINTS_LEDGER` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use points_ledger::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod generation;
mod notifications;
mod payment;
mod service;
mod tasks;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use generation::GenerationConfig;
pub use notifications::NotificationsConfig;
pub use payment::PaymentConfig;
pub use service::{Environment, LogFormat, ServiceConfig};
pub use tasks::TasksConfig;

use serde::Deserialize;

/// Root configuration, built once at startup and passed to the components.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    pub payment: PaymentConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `POINTS_LEDGER` prefix
    /// 3. Uses `__` to separate nested values
    ///
    /// - `POINTS_LEDGER__DATABASE__URL=...` -> `database.url`
    /// - `POINTS_LEDGER__TASKS__WORKER_CONCURRENCY=8` -> `tasks.worker_concurrency`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("POINTS_LEDGER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic checks across every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.service.validate()?;
        self.database.validate()?;
        self.tasks.validate()?;
        self.payment.validate(self.service.environment)?;
        self.notifications.validate()?;
        self.generation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.service.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global; keep these tests serialized.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "POINTS_LEDGER__DATABASE__URL",
        "POINTS_LEDGER__PAYMENT__SUCCESS_URL",
        "POINTS_LEDGER__PAYMENT__CANCEL_URL",
        "POINTS_LEDGER__GENERATION__BASE_URL",
        "POINTS_LEDGER__SERVICE__ENVIRONMENT",
        "POINTS_LEDGER__SERVICE__LOG_FORMAT",
        "POINTS_LEDGER__TASKS__WORKER_CONCURRENCY",
        "POINTS_LEDGER__TASKS__STALE_GRACE_SECS",
    ];

    fn set_minimal_env() {
        env::set_var("POINTS_LEDGER__DATABASE__URL", "postgresql://test@localhost/ledger");
        env::set_var("POINTS_LEDGER__PAYMENT__SUCCESS_URL", "https://app.test/paid");
        env::set_var("POINTS_LEDGER__PAYMENT__CANCEL_URL", "https://app.test/cancelled");
        env::set_var("POINTS_LEDGER__GENERATION__BASE_URL", "http://generator:9000");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_minimal_environment_with_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/ledger");
        assert_eq!(config.tasks.default_max_attempts, 3);
        assert_eq!(config.service.environment, Environment::Development);
        assert!(config.notifications.webhook_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_overrides_are_parsed() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("POINTS_LEDGER__SERVICE__ENVIRONMENT", "production");
        env::set_var("POINTS_LEDGER__SERVICE__LOG_FORMAT", "json");
        env::set_var("POINTS_LEDGER__TASKS__WORKER_CONCURRENCY", "8");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert_eq!(config.service.log_format, LogFormat::Json);
        assert_eq!(config.tasks.worker_concurrency, 8);
    }

    #[test]
    fn missing_database_url_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::remove_var("POINTS_LEDGER__DATABASE__URL");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
