//! Task events - what a scheduler reports back to its caller.

use crate::id::TaskId;
use crate::outcome::Outcome;
use crate::Time;
use serde::{Deserialize, Serialize};

/// Kind of a task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    /// Task finished successfully (`TASK_DONE`)
    Done,
    /// Task failed (`TASK_ERROR`)
    Error,
}

/// Completion event of a root task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Done or error
    pub kind: TaskEventKind,

    /// Root task id
    pub task_id: TaskId,

    /// Device blamed for an error
    pub failing_device: Option<String>,

    /// When the task finished
    pub at: Time,
}

impl TaskEvent {
    /// Build an event from a task outcome.
    pub fn from_outcome(task_id: TaskId, outcome: Outcome) -> Self {
        let kind = if outcome.success {
            TaskEventKind::Done
        } else {
            TaskEventKind::Error
        };
        Self {
            kind,
            task_id,
            failing_device: outcome.failing_device,
            at: chrono::Utc::now(),
        }
    }

    /// Whether the task succeeded.
    pub fn is_done(&self) -> bool {
        self.kind == TaskEventKind::Done
    }
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TaskEventKind::Done => write!(f, "TASK_DONE {}", self.task_id),
            TaskEventKind::Error => write!(
                f,
                "TASK_ERROR {} {}",
                self.task_id,
                self.failing_device.as_deref().unwrap_or("-")
            ),
        }
    }
}
