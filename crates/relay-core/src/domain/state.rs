//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::StateError;

/// Status of a forwarding task.
///
/// State transitions:
/// - Queued -> Processing (claimed by a worker)
/// - Processing -> Completed | Duplicate | Failed (downstream answered)
/// - Processing -> Queued (transport error, re-enqueued after backoff)
/// - Queued | Completed | Duplicate | Failed -> Removed (operator)
///
/// `Processing -> Removed` is never legal: a claimed task cannot be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Duplicate,
    Failed,
    Removed,
}

impl TaskStatus {
    /// Is this a terminal state (no further processing)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Duplicate | TaskStatus::Failed | TaskStatus::Removed
        )
    }

    /// Terminal states whose durable record is deleted.
    /// `Failed` is terminal but its record is kept for inspection.
    pub fn drops_record(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Duplicate | TaskStatus::Removed
        )
    }

    /// Entries that survive a "clear history".
    pub fn is_success(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Duplicate)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Duplicate)
                | (Processing, Failed)
                | (Processing, Queued)
                | (Queued, Removed)
                | (Completed, Removed)
                | (Duplicate, Removed)
                | (Failed, Removed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: TaskStatus) -> Result<TaskStatus, StateError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Duplicate => "duplicate",
            TaskStatus::Failed => "failed",
            TaskStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
