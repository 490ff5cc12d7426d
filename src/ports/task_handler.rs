//! Generation backend port.
//!
//! A handler performs the actual work of a task type. The engine treats it
//! as a black box bounded by a deadline; it only looks at the classification
//! of the returned [`ExecutionError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::task::ExecutionError;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Runs one attempt and returns the task result.
    async fn invoke(&self, task_type: &str, input: &JsonValue) -> Result<JsonValue, ExecutionError>;
}

/// Handlers keyed by task type.
#[derive(Clone, Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task_type.into(), handler);
        self
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TaskHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlerRegistry")
            .field("task_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn invoke(&self, _: &str, input: &JsonValue) -> Result<JsonValue, ExecutionError> {
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn registry_routes_by_task_type() {
        let registry = TaskHandlerRegistry::new().register("echo", Arc::new(Echo));
        assert!(registry.contains("echo"));
        assert!(registry.get("image").is_none());

        let handler = registry.get("echo").unwrap();
        let out = handler.invoke("echo", &json!({ "a": 1 })).await.unwrap();
        assert_eq!(out, json!({ "a": 1 }));
    }
}
