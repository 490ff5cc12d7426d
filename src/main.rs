//! Points ledger worker process.
//!
//! Connects the ledger store and runs the task supervisor until Ctrl-C. The
//! request-facing handlers are library entry points for the routing layer.

use std::sync::Arc;

use tokio::sync::watch;

use points_ledger::adapters::{
    connect_pool, ChannelTaskDispatcher, HttpTaskHandler, HttpTaskHandlerConfig,
    LoggingNotificationSink, PostgresLedgerStore, WebhookNotificationSink,
};
use points_ledger::application::{
    CleanupOldHandler, ExecuteTaskHandler, ProcessPendingHandler, ReclaimStaleHandler,
    TaskSupervisor, TaskSupervisorConfig,
};
use points_ledger::config::AppConfig;
use points_ledger::ports::{
    LedgerStore, NotificationSink, TaskDispatcher, TaskHandler, TaskHandlerRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    points_ledger::init_tracing(&config.service);
    config.validate()?;

    tracing::info!(environment = ?config.service.environment, "Starting points ledger");

    // Store
    let pool = connect_pool(&config.database).await?;
    let postgres = PostgresLedgerStore::new(pool);
    if config.database.run_migrations {
        postgres.migrate().await?;
        tracing::info!("Migrations applied");
    }
    let store: Arc<dyn LedgerStore> = Arc::new(postgres);

    // Outbound collaborators
    let notifier: Arc<dyn NotificationSink> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotificationSink::new(
            url.clone(),
            config.notifications.signing_secret.clone(),
            config.notifications.timeout(),
        )?),
        None => Arc::new(LoggingNotificationSink::new()),
    };

    let mut backend_config = HttpTaskHandlerConfig::new(config.generation.base_url.clone())
        .with_timeout(config.generation.timeout());
    if let Some(key) = &config.generation.api_key {
        backend_config = backend_config.with_api_key(key.clone());
    }
    let backend: Arc<dyn TaskHandler> = Arc::new(HttpTaskHandler::new(backend_config)?);
    let handlers = config
        .generation
        .task_types_list()
        .into_iter()
        .fold(TaskHandlerRegistry::new(), |registry, task_type| {
            registry.register(task_type, backend.clone())
        });
    tracing::info!(?handlers, "Task handlers registered");

    // Task engine
    let (dispatcher, receiver) = ChannelTaskDispatcher::channel(config.tasks.sweep_batch_size * 4);
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(dispatcher);
    let executor = Arc::new(ExecuteTaskHandler::new(
        store.clone(),
        handlers,
        dispatcher.clone(),
        notifier.clone(),
        config.tasks.backoff_policy(),
        config.tasks.attempt_timeout(),
    ));
    let supervisor = TaskSupervisor::new(
        executor,
        ProcessPendingHandler::new(store.clone(), dispatcher.clone()),
        ReclaimStaleHandler::new(
            store.clone(),
            dispatcher,
            notifier,
            config.tasks.backoff_policy(),
            config.tasks.stale_after(),
        ),
        CleanupOldHandler::new(store),
        TaskSupervisorConfig {
            sweep_interval: config.tasks.sweep_interval(),
            sweep_batch_size: config.tasks.sweep_batch_size,
            worker_concurrency: config.tasks.worker_concurrency,
            retention_days: config.tasks.retention_days,
            ..TaskSupervisorConfig::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(async move { supervisor.run(receiver, shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true)?;
    running.await??;

    Ok(())
}
