//! Points Ledger - usage-metered credits for generation features.
//!
//! Accounts hold an integer points balance backed by an append-only
//! transaction trail. Features and async generation tasks spend points,
//! payment confirmations add them, and every balance change commits together
//! with the row that explains it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{LogFormat, ServiceConfig};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides `service.log_level` when set.
pub fn init_tracing(config: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
