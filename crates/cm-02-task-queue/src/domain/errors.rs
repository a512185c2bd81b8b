//! Task queue error types.

use thiserror::Error;

/// Task queue error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Subtask not present in the queue.
    #[error("subtask {0} not found")]
    SubtaskNotFound(String),

    /// Worker has never registered.
    #[error("agent {0} not found")]
    AgentNotFound(String),

    /// The subtask is not in a state the operation accepts.
    #[error("subtask {subtask_id} is {actual}, expected {expected}")]
    InvalidTransition {
        subtask_id: String,
        expected: &'static str,
        actual: &'static str,
    },
}
