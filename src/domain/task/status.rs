//! Task status state machine.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Lifecycle of an asynchronous task.
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED
///    |           |-> PENDING (retry, scheduled later)
///    |           `-> FAILED
///    `-> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(TaskStatus::Pending),
            "PROCESSING" => Some(TaskStatus::Processing),
            "COMPLETED" => Some(TaskStatus::Completed),
            "FAILED" => Some(TaskStatus::Failed),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl StateMachine for TaskStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TaskStatus::*;
        match self {
            Pending => vec![Processing, Cancelled],
            Processing => vec![Completed, Pending, Failed],
            Completed | Failed | Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_path_is_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(&TaskStatus::Pending));
        assert!(TaskStatus::Processing.can_transition_to(&TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(&TaskStatus::Failed));
    }

    #[test]
    fn cancel_only_from_pending() {
        assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Cancelled));
        assert!(!TaskStatus::Processing.can_transition_to(&TaskStatus::Cancelled));
    }

    #[test]
    fn terminal_states_never_resurrect() {
        for status in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(&TaskStatus::Pending));
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(TaskStatus::parse("processing"), Some(TaskStatus::Processing));
        assert_eq!(TaskStatus::parse("RUNNING"), None);
    }
}
