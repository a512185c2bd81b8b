//! # Task Queue - Claim Discipline and Staleness Recovery
//!
//! ## Data Structures
//!
//! - `by_id`: O(1) lookup by subtask id; also holds `completed` and
//!   `remote-claimed` tombstones for idempotency
//! - `order`: BTreeSet of claimable subtasks, priority desc / enqueue asc /
//!   id asc
//! - `workers`: registered agents with heartbeat stamps, for the staleness
//!   half of `requeue_stale`
//!
//! All mutators take `&mut self`; the service wraps the queue in a single
//! mutex so `claim` is atomic and exactly one agent wins per subtask.

use super::entities::{AgentPolicy, EnqueueOpts, QueueConfig, QueuedSubtask, WorkerEntry};
use super::errors::QueueError;
use shared_types::{Subtask, SubtaskResult, SubtaskStatus};
use std::collections::{BTreeSet, HashMap};

/// Ordering key for claimable subtasks.
///
/// Higher priority first; ties broken by earliest enqueue, then smallest id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueKey {
    priority: i32,
    enqueued_at_ms: u64,
    id: String,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.enqueued_at_ms.cmp(&other.enqueued_at_ms))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The subtask queue.
#[derive(Debug, Default)]
pub struct TaskQueue {
    config: QueueConfig,
    by_id: HashMap<String, QueuedSubtask>,
    order: BTreeSet<QueueKey>,
    workers: HashMap<String, WorkerEntry>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            by_id: HashMap::new(),
            order: BTreeSet::new(),
            workers: HashMap::new(),
        }
    }

    /// Number of entries in `queued` state.
    pub fn queued_len(&self) -> usize {
        self.order.len()
    }

    /// Total entries, tombstones included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look up a subtask's current state.
    pub fn get(&self, subtask_id: &str) -> Option<&QueuedSubtask> {
        self.by_id.get(subtask_id)
    }

    /// Record a worker and its execution policy.
    pub fn register_agent(
        &mut self,
        agent_id: &str,
        policy: AgentPolicy,
        capabilities: Vec<String>,
        now_ms: u64,
    ) {
        self.workers.insert(
            agent_id.to_string(),
            WorkerEntry {
                agent_id: agent_id.to_string(),
                policy,
                capabilities,
                last_seen_ms: now_ms,
            },
        );
    }

    /// Stamp worker liveness.
    pub fn heartbeat(&mut self, agent_id: &str, now_ms: u64) -> Result<(), QueueError> {
        match self.workers.get_mut(agent_id) {
            Some(worker) => {
                worker.last_seen_ms = now_ms;
                Ok(())
            }
            None => Err(QueueError::AgentNotFound(agent_id.to_string())),
        }
    }

    /// Registered worker lookup.
    pub fn worker(&self, agent_id: &str) -> Option<&WorkerEntry> {
        self.workers.get(agent_id)
    }

    /// Insert a subtask. Duplicate ids (including tombstones) are a no-op.
    ///
    /// Returns `true` when the subtask was actually inserted.
    pub fn enqueue_subtask(&mut self, subtask: Subtask, opts: EnqueueOpts, now_ms: u64) -> bool {
        if self.by_id.contains_key(&subtask.id) {
            return false;
        }
        let key = QueueKey {
            priority: subtask.priority,
            enqueued_at_ms: now_ms,
            id: subtask.id.clone(),
        };
        self.by_id.insert(
            subtask.id.clone(),
            QueuedSubtask {
                subtask,
                status: SubtaskStatus::Queued,
                enqueued_at_ms: now_ms,
                claim_delay_ms: opts.claim_delay_ms,
                claimed_by: None,
                claimed_at_ms: None,
            },
        );
        self.order.insert(key);
        true
    }

    /// Atomically claim the first eligible subtask for an agent.
    ///
    /// Eligibility: `queued` status, requested model unset or equal to
    /// `preferred_model`, and the claim-delay window elapsed. The window is
    /// honored even when the queue is otherwise empty.
    pub fn claim(
        &mut self,
        agent_id: &str,
        preferred_model: Option<&str>,
        now_ms: u64,
    ) -> Option<Subtask> {
        let key = self.order.iter().find_map(|key| {
            let entry = self.by_id.get(&key.id)?;
            if now_ms < entry.locally_claimable_at() {
                return None;
            }
            match (&entry.subtask.requested_model, preferred_model) {
                (None, _) => Some(key.clone()),
                (Some(want), Some(have)) if want == have => Some(key.clone()),
                _ => None,
            }
        })?;

        self.order.remove(&key);
        let entry = self.by_id.get_mut(&key.id)?;
        entry.status = SubtaskStatus::Claimed;
        entry.claimed_by = Some(agent_id.to_string());
        entry.claimed_at_ms = Some(now_ms);
        Some(entry.subtask.clone())
    }

    /// Return a claimed subtask to `queued` (sandbox miss, power filter,
    /// stale claim). Keeps the original enqueue time so it does not lose its
    /// place.
    pub fn requeue(&mut self, subtask_id: &str) -> Result<(), QueueError> {
        let entry = self
            .by_id
            .get_mut(subtask_id)
            .ok_or_else(|| QueueError::SubtaskNotFound(subtask_id.to_string()))?;
        if entry.status != SubtaskStatus::Claimed {
            return Err(QueueError::InvalidTransition {
                subtask_id: subtask_id.to_string(),
                expected: "claimed",
                actual: status_name(entry.status),
            });
        }
        entry.status = SubtaskStatus::Queued;
        entry.claimed_by = None;
        entry.claimed_at_ms = None;
        self.order.insert(QueueKey {
            priority: entry.subtask.priority,
            enqueued_at_ms: entry.enqueued_at_ms,
            id: subtask_id.to_string(),
        });
        Ok(())
    }

    /// Requeue every claim older than `max_claim_age_ms` whose worker is
    /// stale (or was never registered). Returns the requeued ids.
    pub fn requeue_stale(&mut self, max_claim_age_ms: u64, now_ms: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .by_id
            .values()
            .filter(|entry| {
                entry.status == SubtaskStatus::Claimed
                    && entry
                        .claimed_at_ms
                        .is_some_and(|at| now_ms.saturating_sub(at) > max_claim_age_ms)
                    && entry.claimed_by.as_deref().map_or(true, |agent| {
                        self.workers.get(agent).map_or(true, |w| {
                            now_ms.saturating_sub(w.last_seen_ms) > self.config.worker_stale_ms
                        })
                    })
            })
            .map(|entry| entry.subtask.id.clone())
            .collect();

        for id in &stale {
            // Entries were just observed claimed; requeue cannot fail here.
            let _ = self.requeue(id);
        }
        stale
    }

    /// A peer coordinator broadcast `task_claim`: drop the subtask from the
    /// local queue if still queued. The tombstone stays so a replayed offer
    /// cannot re-enqueue it.
    pub fn mark_remote_claimed(&mut self, subtask_id: &str) -> bool {
        match self.by_id.get_mut(subtask_id) {
            Some(entry) if entry.status == SubtaskStatus::Queued => {
                self.order.remove(&QueueKey {
                    priority: entry.subtask.priority,
                    enqueued_at_ms: entry.enqueued_at_ms,
                    id: subtask_id.to_string(),
                });
                entry.status = SubtaskStatus::RemoteClaimed;
                true
            }
            _ => false,
        }
    }

    /// Transition a claimed subtask to `completed`. Idempotent by subtask id:
    /// the first call returns `true`, repeats return `false`.
    pub fn complete(&mut self, result: &SubtaskResult) -> Result<bool, QueueError> {
        let entry = self
            .by_id
            .get_mut(&result.subtask_id)
            .ok_or_else(|| QueueError::SubtaskNotFound(result.subtask_id.clone()))?;
        match entry.status {
            SubtaskStatus::Completed => Ok(false),
            SubtaskStatus::Claimed => {
                entry.status = SubtaskStatus::Completed;
                Ok(true)
            }
            other => Err(QueueError::InvalidTransition {
                subtask_id: result.subtask_id.clone(),
                expected: "claimed",
                actual: status_name(other),
            }),
        }
    }

    /// Ids of currently queued subtasks, in claim order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.order.iter().map(|k| k.id.clone()).collect()
    }
}

fn status_name(status: SubtaskStatus) -> &'static str {
    match status {
        SubtaskStatus::Queued => "queued",
        SubtaskStatus::Held => "held",
        SubtaskStatus::Claimed => "claimed",
        SubtaskStatus::Completed => "completed",
        SubtaskStatus::RemoteClaimed => "remote-claimed",
    }
}
