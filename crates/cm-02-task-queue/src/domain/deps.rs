//! # Dependency Tracker
//!
//! Holds subtasks whose `depends_on` set is not yet satisfied and releases
//! them as predecessors complete. The tracker never references the queue
//! type; the caller passes an enqueue closure, so ownership stays acyclic.
//!
//! Circular batches are detected up front: every subtask on a cycle is
//! enqueued immediately instead of held, so no batch can deadlock.

use super::entities::EnqueueOpts;
use shared_types::Subtask;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug)]
struct HeldSubtask {
    subtask: Subtask,
    unmet: HashSet<String>,
    enqueue_opts: EnqueueOpts,
}

/// Tracks subtasks with unsatisfied predecessors.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    held: HashMap<String, HeldSubtask>,
    /// Outputs of completed predecessors, available to released subtasks.
    completed_outputs: HashMap<String, String>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of held subtasks.
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// True when a subtask is currently held.
    pub fn is_held(&self, subtask_id: &str) -> bool {
        self.held.contains_key(subtask_id)
    }

    /// Store a subtask until all of `depends_on` complete.
    ///
    /// Predecessors that already completed are not counted as unmet; a
    /// subtask whose whole set is already satisfied is released through
    /// `enqueue_fn` immediately.
    pub fn hold<F>(
        &mut self,
        subtask: Subtask,
        depends_on: &[String],
        enqueue_opts: EnqueueOpts,
        enqueue_fn: &mut F,
    ) where
        F: FnMut(Subtask, EnqueueOpts),
    {
        let unmet: HashSet<String> = depends_on
            .iter()
            .filter(|dep| !self.completed_outputs.contains_key(*dep))
            .cloned()
            .collect();

        if unmet.is_empty() {
            enqueue_fn(subtask, enqueue_opts);
            return;
        }

        self.held.insert(
            subtask.id.clone(),
            HeldSubtask {
                subtask,
                unmet,
                enqueue_opts,
            },
        );
    }

    /// Record a completion, clear it from every pending dependency set, and
    /// enqueue (via `enqueue_fn`) each subtask whose set is now empty.
    ///
    /// Returns the released subtasks.
    pub fn record_completion_and_release<F>(
        &mut self,
        subtask_id: &str,
        output: &str,
        enqueue_fn: &mut F,
    ) -> Vec<Subtask>
    where
        F: FnMut(Subtask, EnqueueOpts),
    {
        self.completed_outputs
            .insert(subtask_id.to_string(), output.to_string());

        let mut released_ids = Vec::new();
        for (id, held) in self.held.iter_mut() {
            held.unmet.remove(subtask_id);
            if held.unmet.is_empty() {
                released_ids.push(id.clone());
            }
        }

        let mut released = Vec::new();
        for id in released_ids {
            if let Some(held) = self.held.remove(&id) {
                enqueue_fn(held.subtask.clone(), held.enqueue_opts);
                released.push(held.subtask);
            }
        }
        released
    }

    /// Output recorded for a completed predecessor.
    pub fn completed_output(&self, subtask_id: &str) -> Option<&str> {
        self.completed_outputs.get(subtask_id).map(|s| s.as_str())
    }

    /// Depth-first cycle detection over a submitted batch.
    ///
    /// Returns the ids of every subtask that appears on a cycle. Edges point
    /// only at predecessors inside the batch; dependencies on ids outside the
    /// batch cannot form a cycle here.
    pub fn detect_circular(batch: &[Subtask]) -> HashSet<String> {
        let ids: HashSet<&str> = batch.iter().map(|s| s.id.as_str()).collect();
        let edges: HashMap<&str, Vec<&str>> = batch
            .iter()
            .map(|s| {
                (
                    s.id.as_str(),
                    s.depends_on
                        .iter()
                        .map(|d| d.as_str())
                        .filter(|d| ids.contains(d))
                        .collect(),
                )
            })
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
            cyclic: &mut HashSet<String>,
        ) {
            marks.insert(node, Mark::InStack);
            stack.push(node);
            for next in edges.get(node).into_iter().flatten() {
                match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Unvisited => visit(next, edges, marks, stack, cyclic),
                    Mark::InStack => {
                        // Everything from `next` to the top of the stack is on
                        // the cycle.
                        let start = stack.iter().position(|n| n == next).unwrap_or(0);
                        for member in &stack[start..] {
                            cyclic.insert((*member).to_string());
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut cyclic = HashSet::new();
        for subtask in batch {
            if marks.get(subtask.id.as_str()).copied().unwrap_or(Mark::Unvisited) == Mark::Unvisited
            {
                let mut stack = Vec::new();
                visit(
                    subtask.id.as_str(),
                    &edges,
                    &mut marks,
                    &mut stack,
                    &mut cyclic,
                );
            }
        }

        if !cyclic.is_empty() {
            warn!(
                count = cyclic.len(),
                "circular dependencies in batch; members enqueued immediately"
            );
        }
        cyclic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SubtaskKind;

    fn subtask(id: &str, depends_on: &[&str]) -> Subtask {
        Subtask {
            id: id.into(),
            task_id: "T1".into(),
            kind: SubtaskKind::MicroLoop,
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

    #[test]
    fn releases_only_when_all_predecessors_complete() {
        let mut tracker = DependencyTracker::new();
        let mut enqueued: Vec<String> = Vec::new();
        let mut enqueue = |s: Subtask, _o: EnqueueOpts| enqueued.push(s.id);

        let s3 = subtask("S3", &["S1", "S2"]);
        tracker.hold(s3.clone(), &s3.depends_on.clone(), EnqueueOpts::default(), &mut enqueue);

        assert!(tracker
            .record_completion_and_release("S1", "out1", &mut enqueue)
            .is_empty());
        assert!(tracker.is_held("S3"));

        let released = tracker.record_completion_and_release("S2", "out2", &mut enqueue);
        assert_eq!(released.len(), 1);
        assert_eq!(enqueued, vec!["S3".to_string()]);
        assert_eq!(tracker.held_len(), 0);
    }

    #[test]
    fn hold_with_already_satisfied_set_enqueues_immediately() {
        let mut tracker = DependencyTracker::new();
        let mut enqueued: Vec<String> = Vec::new();
        let mut enqueue = |s: Subtask, _o: EnqueueOpts| enqueued.push(s.id);

        tracker.record_completion_and_release("S1", "done", &mut enqueue);
        let s2 = subtask("S2", &["S1"]);
        tracker.hold(s2.clone(), &s2.depends_on.clone(), EnqueueOpts::default(), &mut enqueue);

        assert_eq!(enqueued, vec!["S2".to_string()]);
        assert_eq!(tracker.held_len(), 0);
    }

    #[test]
    fn detects_two_node_cycle() {
        let batch = vec![subtask("A", &["B"]), subtask("B", &["A"]), subtask("C", &[])];
        let cyclic = DependencyTracker::detect_circular(&batch);
        assert_eq!(cyclic.len(), 2);
        assert!(cyclic.contains("A") && cyclic.contains("B"));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let batch = vec![subtask("A", &["A"])];
        assert!(DependencyTracker::detect_circular(&batch).contains("A"));
    }

    #[test]
    fn chain_is_not_a_cycle() {
        let batch = vec![subtask("A", &[]), subtask("B", &["A"]), subtask("C", &["B"])];
        assert!(DependencyTracker::detect_circular(&batch).is_empty());
    }

    #[test]
    fn dependency_outside_batch_does_not_cycle() {
        let batch = vec![subtask("A", &["external"])];
        assert!(DependencyTracker::detect_circular(&batch).is_empty());
    }
}
