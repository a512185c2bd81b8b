//! # Queue Service
//!
//! Lock owner for the queue and the dependency tracker. Every mutator runs
//! under the single queue mutex, which is what makes `claim` atomic; the
//! dependency tracker has its own lock and never calls back into the queue
//! while either lock is held.

use crate::domain::{
    AgentPolicy, DependencyTracker, EnqueueOpts, QueueConfig, QueueError, QueuedSubtask, TaskQueue,
};
use crate::ports::outbound::TimeSource;
use parking_lot::Mutex;
use shared_types::{Subtask, SubtaskResult};
use std::sync::Arc;
use tracing::debug;

/// What happened to a submitted batch.
#[derive(Debug, Clone, Default)]
pub struct IntakeSummary {
    /// Ids that went straight to the queue.
    pub enqueued: Vec<String>,
    /// Ids parked in the dependency tracker.
    pub held: Vec<String>,
}

/// Outcome of a completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionOutcome {
    /// False when this result was a duplicate.
    pub newly_completed: bool,
    /// Held subtasks this completion released into the queue.
    pub released: Vec<Subtask>,
}

/// Thread-safe facade over [`TaskQueue`] + [`DependencyTracker`].
pub struct QueueService {
    queue: Mutex<TaskQueue>,
    deps: Mutex<DependencyTracker>,
    time: Arc<dyn TimeSource>,
    config: QueueConfig,
}

impl QueueService {
    /// Create a service with the given configuration and clock.
    pub fn new(config: QueueConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            queue: Mutex::new(TaskQueue::new(config.clone())),
            deps: Mutex::new(DependencyTracker::new()),
            time,
            config,
        }
    }

    /// Record a worker and its execution policy.
    pub fn register_agent(&self, agent_id: &str, policy: AgentPolicy, capabilities: Vec<String>) {
        let now = self.time.now_ms();
        self.queue
            .lock()
            .register_agent(agent_id, policy, capabilities, now);
    }

    /// Stamp worker liveness.
    pub fn heartbeat(&self, agent_id: &str) -> Result<(), QueueError> {
        let now = self.time.now_ms();
        self.queue.lock().heartbeat(agent_id, now)
    }

    /// Take in a decomposed batch: cycle members and dependency-free subtasks
    /// are enqueued immediately, the rest are held until predecessors land.
    pub fn intake_batch(&self, batch: Vec<Subtask>, opts: EnqueueOpts) -> IntakeSummary {
        let cyclic = DependencyTracker::detect_circular(&batch);
        let now = self.time.now_ms();
        let mut summary = IntakeSummary::default();

        // Collect holds first so the two locks are never nested.
        let mut to_hold = Vec::new();
        {
            let mut queue = self.queue.lock();
            for subtask in batch {
                if subtask.depends_on.is_empty() || cyclic.contains(&subtask.id) {
                    if queue.enqueue_subtask(subtask.clone(), opts, now) {
                        summary.enqueued.push(subtask.id);
                    }
                } else {
                    to_hold.push(subtask);
                }
            }
        }

        let mut immediate = Vec::new();
        {
            let mut deps = self.deps.lock();
            for subtask in to_hold {
                let depends_on = subtask.depends_on.clone();
                let id = subtask.id.clone();
                let mut sink = |s: Subtask, o: EnqueueOpts| immediate.push((s, o));
                deps.hold(subtask, &depends_on, opts, &mut sink);
                if !immediate.iter().any(|(s, _)| s.id == id) {
                    summary.held.push(id);
                }
            }
        }

        if !immediate.is_empty() {
            let mut queue = self.queue.lock();
            for (subtask, o) in immediate {
                if queue.enqueue_subtask(subtask.clone(), o, now) {
                    summary.enqueued.push(subtask.id);
                }
            }
        }

        debug!(
            enqueued = summary.enqueued.len(),
            held = summary.held.len(),
            "batch intake"
        );
        summary
    }

    /// Enqueue a single subtask (local submit or remote task offer).
    pub fn enqueue_subtask(&self, subtask: Subtask, opts: EnqueueOpts) -> bool {
        let now = self.time.now_ms();
        self.queue.lock().enqueue_subtask(subtask, opts, now)
    }

    /// Atomically claim the first eligible subtask.
    pub fn claim(&self, agent_id: &str, preferred_model: Option<&str>) -> Option<Subtask> {
        let now = self.time.now_ms();
        self.queue.lock().claim(agent_id, preferred_model, now)
    }

    /// Return a claimed subtask to the queue.
    pub fn requeue(&self, subtask_id: &str) -> Result<(), QueueError> {
        self.queue.lock().requeue(subtask_id)
    }

    /// Requeue stale claims. Returns the requeued ids.
    pub fn requeue_stale(&self) -> Vec<String> {
        let now = self.time.now_ms();
        self.queue
            .lock()
            .requeue_stale(self.config.max_claim_age_ms, now)
    }

    /// Handle a peer's `task_claim`: drop from the local queue if queued.
    pub fn mark_remote_claimed(&self, subtask_id: &str) -> bool {
        self.queue.lock().mark_remote_claimed(subtask_id)
    }

    /// Complete a claimed subtask and release its dependents.
    pub fn complete(&self, result: &SubtaskResult) -> Result<CompletionOutcome, QueueError> {
        let newly_completed = self.queue.lock().complete(result)?;
        if !newly_completed {
            return Ok(CompletionOutcome::default());
        }

        // Release dependents outside the queue lock, then enqueue them.
        let mut to_enqueue: Vec<(Subtask, EnqueueOpts)> = Vec::new();
        let released = {
            let mut deps = self.deps.lock();
            let mut sink = |s: Subtask, o: EnqueueOpts| to_enqueue.push((s, o));
            deps.record_completion_and_release(&result.subtask_id, &result.output, &mut sink)
        };

        if !to_enqueue.is_empty() {
            let now = self.time.now_ms();
            let mut queue = self.queue.lock();
            for (subtask, opts) in to_enqueue {
                queue.enqueue_subtask(subtask, opts, now);
            }
        }

        Ok(CompletionOutcome {
            newly_completed,
            released,
        })
    }

    /// Current queued depth.
    pub fn queued_len(&self) -> usize {
        self.queue.lock().queued_len()
    }

    /// Held (dependency-parked) depth.
    pub fn held_len(&self) -> usize {
        self.deps.lock().held_len()
    }

    /// Snapshot of one subtask's queue state.
    pub fn get(&self, subtask_id: &str) -> Option<QueuedSubtask> {
        self.queue.lock().get(subtask_id).cloned()
    }

    /// Ids currently claimable, in claim order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.queue.lock().queued_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::FixedTimeSource;
    use shared_types::SubtaskKind;

    fn subtask(id: &str, depends_on: &[&str]) -> Subtask {
        Subtask {
            id: id.into(),
            task_id: "T1".into(),
            kind: SubtaskKind::SingleStep,
            language: "python".into(),
            input: String::new(),
            timeout_ms: 30_000,
            snapshot_ref: "a".repeat(40),
            project_meta: serde_json::Value::Null,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            requested_model: None,
            tenant_id: None,
            priority: 0,
        }
    }

    fn service() -> QueueService {
        QueueService::new(
            QueueConfig::default(),
            Arc::new(FixedTimeSource::at(1_000)),
        )
    }

    #[test]
    fn batch_with_dependencies_holds_then_releases() {
        let svc = service();
        let summary = svc.intake_batch(
            vec![subtask("S1", &[]), subtask("S2", &["S1"])],
            EnqueueOpts::default(),
        );
        assert_eq!(summary.enqueued, vec!["S1".to_string()]);
        assert_eq!(summary.held, vec!["S2".to_string()]);
        assert_eq!(svc.queued_len(), 1);

        let claimed = svc.claim("w", None).unwrap();
        let outcome = svc
            .complete(&SubtaskResult {
                subtask_id: claimed.id,
                task_id: "T1".into(),
                ok: true,
                output: "4".into(),
                duration_ms: 5,
                error: None,
            })
            .unwrap();
        assert!(outcome.newly_completed);
        assert_eq!(outcome.released.len(), 1);
        assert_eq!(svc.queued_ids(), vec!["S2".to_string()]);
    }

    #[test]
    fn circular_batch_members_enqueue_immediately() {
        let svc = service();
        let summary = svc.intake_batch(
            vec![subtask("A", &["B"]), subtask("B", &["A"])],
            EnqueueOpts::default(),
        );
        assert_eq!(summary.held.len(), 0);
        assert_eq!(svc.queued_len(), 2);
    }
}
