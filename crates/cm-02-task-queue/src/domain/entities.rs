//! Queue-local entities and configuration.

use shared_types::{SandboxMode, Subtask, SubtaskStatus};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Claims older than this are candidates for staleness requeue.
    pub max_claim_age_ms: u64,
    /// A worker is stale when its last heartbeat is older than this.
    pub worker_stale_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_claim_age_ms: 30_000,
            worker_stale_ms: 120_000,
        }
    }
}

/// Execution policy a worker registered with.
#[derive(Debug, Clone, Default)]
pub struct AgentPolicy {
    pub max_concurrent_tasks: u32,
    pub sandbox_mode: SandboxMode,
}

/// A worker known to the queue, for staleness decisions.
#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub agent_id: String,
    pub policy: AgentPolicy,
    pub capabilities: Vec<String>,
    pub last_seen_ms: u64,
}

/// Options for `enqueue_subtask`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOpts {
    /// Delay local claimability so a peer coordinator can claim first.
    pub claim_delay_ms: u64,
}

/// A subtask plus its queue bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedSubtask {
    pub subtask: Subtask,
    pub status: SubtaskStatus,
    pub enqueued_at_ms: u64,
    pub claim_delay_ms: u64,
    pub claimed_by: Option<String>,
    pub claimed_at_ms: Option<u64>,
}

impl QueuedSubtask {
    /// True once `claim_delay_ms` has elapsed since enqueue.
    pub fn locally_claimable_at(&self) -> u64 {
        self.enqueued_at_ms.saturating_add(self.claim_delay_ms)
    }
}
