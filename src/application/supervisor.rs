//! TaskSupervisor - Background service that runs dispatched tasks.
//!
//! Three loops share one `select!`:
//! 1. Dispatched task ids are executed by a bounded worker pool
//! 2. A periodic sweep reclaims attempts whose worker vanished, then
//!    re-dispatches due PENDING tasks whose dispatch was lost
//! 3. A daily cleanup removes terminal tasks past the retention window
//!
//! ## Graceful Shutdown
//!
//! On shutdown the supervisor stops accepting ids and waits for in-flight
//! attempts. Tasks still queued in the channel stay PENDING and are picked
//! up by the next process's sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::adapters::DispatchReceiver;
use crate::application::handlers::tasks::{
    CleanupOldHandler, ExecuteTaskHandler, ProcessPendingHandler, ReclaimStaleHandler,
};
use crate::domain::foundation::{DomainError, ErrorCode};

/// Configuration for the TaskSupervisor.
#[derive(Debug, Clone)]
pub struct TaskSupervisorConfig {
    /// How often to sweep for due tasks.
    pub sweep_interval: Duration,

    /// Maximum tasks dispatched per sweep.
    pub sweep_batch_size: usize,

    /// Attempts executed concurrently.
    pub worker_concurrency: usize,

    pub cleanup_interval: Duration,

    pub retention_days: u32,
}

impl Default for TaskSupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            sweep_batch_size: 50,
            worker_concurrency: 4,
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 30,
        }
    }
}

impl TaskSupervisorConfig {
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

pub struct TaskSupervisor {
    executor: Arc<ExecuteTaskHandler>,
    sweeper: ProcessPendingHandler,
    reclaimer: ReclaimStaleHandler,
    cleanup: CleanupOldHandler,
    config: TaskSupervisorConfig,
}

impl TaskSupervisor {
    pub fn new(
        executor: Arc<ExecuteTaskHandler>,
        sweeper: ProcessPendingHandler,
        reclaimer: ReclaimStaleHandler,
        cleanup: CleanupOldHandler,
        config: TaskSupervisorConfig,
    ) -> Self {
        Self {
            executor,
            sweeper,
            reclaimer,
            cleanup,
            config,
        }
    }

    /// Runs until the shutdown signal flips to `true` or every dispatcher
    /// has been dropped.
    pub async fn run(
        &self,
        mut receiver: DispatchReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DomainError> {
        let permits = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
        let mut workers = JoinSet::new();

        let mut sweep = time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = time::interval(self.config.cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            workers = self.config.worker_concurrency,
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Task supervisor started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                received = receiver.recv() => {
                    let Some(task_id) = received else {
                        tracing::info!("Dispatch channel closed");
                        break;
                    };
                    let permit = permits.clone().acquire_owned().await.map_err(|_| {
                        DomainError::new(ErrorCode::InternalError, "Worker pool closed")
                    })?;
                    let executor = self.executor.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = executor.handle(task_id).await {
                            tracing::error!(task_id = %task_id, error = %e, "Task attempt aborted");
                        }
                    });
                }

                _ = sweep.tick() => {
                    self.sweep_once().await;
                }

                _ = cleanup.tick() => {
                    self.cleanup_once().await;
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Task worker panicked");
                    }
                }
            }
        }

        let in_flight = workers.len();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task worker panicked");
            }
        }
        tracing::info!(in_flight, "Task supervisor stopped");
        Ok(())
    }

    /// One sweep cycle. Errors are logged; the next tick tries again.
    ///
    /// Returns the number of due tasks dispatched.
    pub async fn sweep_once(&self) -> usize {
        if let Err(e) = self.reclaimer.handle(self.config.sweep_batch_size).await {
            tracing::error!(error = %e, "Stale task reclaim failed");
        }
        match self.sweeper.handle(self.config.sweep_batch_size).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                tracing::error!(error = %e, "Task sweep failed");
                0
            }
        }
    }

    pub async fn cleanup_once(&self) -> u64 {
        match self.cleanup.handle(self.config.retention_days).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(error = %e, "Task cleanup failed");
                0
            }
        }
    }
}
