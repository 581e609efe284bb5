//! Task error types

use crate::state::TaskStatus;
use crate::task::TaskId;
use thiserror::Error;

/// Result type alias for task operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors surfaced by the registry, runner and orchestrator
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("Task {0} is already running")]
    AlreadyRunning(TaskId),

    #[error("Invalid status transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Task {0} has not finished successfully")]
    NotReady(TaskId),

    #[error("Output artifact for task {0} is missing")]
    ArtifactMissing(TaskId),

    #[error("Invalid filename")]
    InvalidFilename,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub(crate) fn spawn_failed(program: &str, err: impl std::fmt::Display) -> Self {
        TaskError::SpawnFailed {
            program: program.to_string(),
            message: err.to_string(),
        }
    }

    /// Expected operational conditions, reported to the caller but not logged as errors
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TaskError::NotFound(_)
                | TaskError::AlreadyRunning(_)
                | TaskError::NotReady(_)
                | TaskError::ArtifactMissing(_)
                | TaskError::InvalidFilename
        )
    }
}
