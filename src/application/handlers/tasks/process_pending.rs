//! ProcessPendingHandler - Sweep for due PENDING tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::domain::ledger::LedgerError;
use crate::ports::{LedgerStore, TaskDispatcher};

/// Re-dispatches PENDING tasks whose `scheduled_at` has passed.
///
/// Recovers tasks whose in-process dispatch was lost. Dispatching a task
/// that is also queued elsewhere is harmless: only one claim succeeds.
pub struct ProcessPendingHandler {
    store: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl ProcessPendingHandler {
    pub fn new(store: Arc<dyn LedgerStore>, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Returns the number of tasks dispatched.
    pub async fn handle(&self, limit: usize) -> Result<usize, LedgerError> {
        let due = self.store.due_task_ids(Timestamp::now(), limit).await?;
        let mut dispatched = 0;

        for task_id in due {
            match self.dispatcher.dispatch(task_id, Duration::ZERO).await {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    tracing::warn!(task_id = %task_id, error = %e, "Sweep dispatch failed");
                }
            }
        }

        if dispatched > 0 {
            tracing::debug!(dispatched, "Sweep dispatched due tasks");
        }
        Ok(dispatched)
    }
}
