//! Task state machine
//!
//! ```text
//! Pending ──► Running ──► Succeeded
//!                │
//!                └──────► Failed ──► Running (retry)
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task, carried on the wire as its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskStatus {
    /// Created, never executed
    Pending,

    /// An execution is in flight
    Running,

    /// The last execution exited successfully
    Succeeded,

    /// The last execution failed, could not start, or lost its client
    Failed,
}

impl TaskStatus {
    pub fn code(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Failed => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Pending),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Succeeded),
            3 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Whether an execution may start from this status
    pub fn can_start(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending | TaskStatus::Failed, TaskStatus::Running) => true,
            (TaskStatus::Running, TaskStatus::Succeeded | TaskStatus::Failed) => true,
            _ => false,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        TaskStatus::from_code(code).ok_or_else(|| format!("unknown task status code {}", code))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
