//! Outbound (driven) ports for the gateway.

use async_trait::async_trait;
use shared_types::{Subtask, TaskSubmission};

/// The inference service's `decompose` endpoint.
///
/// Failure maps to a 502 for the submitter; the task is not enqueued.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Decompose a prompt into subtasks.
    async fn decompose(&self, submission: &TaskSubmission) -> Result<Vec<Subtask>, String>;
}
