//! Property tests for the load-bearing invariants: chain integrity, claim
//! uniqueness, dependency liveness, nonce replay, and quorum thresholds.

use cm_02_task_queue::ports::outbound::FixedTimeSource;
use cm_02_task_queue::{DependencyTracker, EnqueueOpts, QueueConfig, QueueService, TaskQueue};
use cm_03_ordering_chain::stats::checkpoint;
use cm_03_ordering_chain::{ChainService, OrderingChain, StatsLedger};
use proptest::prelude::*;
use shared_crypto::Ed25519KeyPair;
use shared_types::security::NonceStore;
use shared_types::{
    ChainDraft, ChainEventType, InMemoryNonceStore, Subtask, SubtaskKind, GENESIS_HASH,
};
use std::collections::HashSet;
use std::sync::Arc;

fn draft(event_type: ChainEventType, task_id: String) -> ChainDraft {
    ChainDraft {
        event_type,
        task_id,
        subtask_id: None,
        actor_id: "actor".into(),
        checkpoint_height: None,
        checkpoint_hash: None,
        payload_json: None,
    }
}

fn subtask(id: String, depends_on: Vec<String>) -> Subtask {
    Subtask {
        id,
        task_id: "T".into(),
        kind: SubtaskKind::SingleStep,
        language: "python".into(),
        input: String::new(),
        timeout_ms: 1_000,
        snapshot_ref: String::new(),
        project_meta: serde_json::Value::Null,
        depends_on,
        requested_model: None,
        tenant_id: None,
        priority: 0,
    }
}

proptest! {
    /// Any append sequence yields a chain that verifies, with GENESIS
    /// linkage and sequences 1..=n.
    #[test]
    fn chain_integrity(task_ids in proptest::collection::vec("[a-z]{1,8}", 1..40)) {
        let kp = Arc::new(Ed25519KeyPair::generate());
        let mut chain = OrderingChain::new("coord-p", kp.clone());
        for (i, task_id) in task_ids.iter().enumerate() {
            chain.append(draft(ChainEventType::TaskEnqueue, task_id.clone()), i as u64).unwrap();
        }

        let records = chain.snapshot();
        prop_assert!(OrderingChain::verify(&records, &kp.public_key()).is_ok());
        prop_assert_eq!(records[0].prev_hash.as_str(), GENESIS_HASH);
        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(record.sequence, i as u64 + 1);
            if i > 0 {
                prop_assert_eq!(&record.prev_hash, &records[i - 1].hash);
            }
        }
    }

    /// Flipping any byte of any record breaks verification.
    #[test]
    fn chain_tamper_detected(
        len in 2usize..20,
        victim in 0usize..20,
    ) {
        let kp = Arc::new(Ed25519KeyPair::generate());
        let mut chain = OrderingChain::new("coord-p", kp.clone());
        for i in 0..len {
            chain.append(draft(ChainEventType::TaskEnqueue, format!("T{i}")), i as u64).unwrap();
        }
        let mut records = chain.snapshot();
        let victim = victim % len;
        records[victim].task_id.push('!');
        prop_assert!(OrderingChain::verify(&records, &kp.public_key()).is_err());
    }

    /// For any interleaving of claims across agents, every subtask is won
    /// exactly once.
    #[test]
    fn claim_uniqueness(
        subtask_count in 1usize..15,
        claimers in proptest::collection::vec(0usize..5, 1..60),
    ) {
        let mut queue = TaskQueue::new(QueueConfig::default());
        for i in 0..subtask_count {
            queue.enqueue_subtask(subtask(format!("S{i:02}"), vec![]), EnqueueOpts::default(), 0);
        }

        let mut winners: Vec<(String, usize)> = Vec::new();
        for (step, claimer) in claimers.iter().enumerate() {
            if let Some(won) = queue.claim(&format!("agent-{claimer}"), None, step as u64 + 1) {
                winners.push((won.id, *claimer));
            }
        }

        let distinct: HashSet<&String> = winners.iter().map(|(id, _)| id).collect();
        prop_assert_eq!(distinct.len(), winners.len());
        prop_assert!(winners.len() <= subtask_count);
    }

    /// Held subtasks release only after all predecessors complete, and no
    /// batch (cyclic ones included) leaves anything stuck forever.
    #[test]
    fn dependency_liveness(edges in proptest::collection::vec((0usize..8, 0usize..8), 0..20)) {
        let ids: Vec<String> = (0..8).map(|i| format!("S{i}")).collect();
        let batch: Vec<Subtask> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let depends: Vec<String> = edges
                    .iter()
                    .filter(|(from, _)| *from == i)
                    .map(|(_, to)| ids[*to].clone())
                    .collect();
                subtask(id.clone(), depends)
            })
            .collect();

        let cyclic = DependencyTracker::detect_circular(&batch);
        let mut tracker = DependencyTracker::new();
        let mut queued: Vec<Subtask> = Vec::new();

        {
            let mut enqueue = |s: Subtask, _o: EnqueueOpts| queued.push(s);
            for s in &batch {
                if s.depends_on.is_empty() || cyclic.contains(&s.id) {
                    enqueue(s.clone(), EnqueueOpts::default());
                } else {
                    let deps = s.depends_on.clone();
                    tracker.hold(s.clone(), &deps, EnqueueOpts::default(), &mut enqueue);
                }
            }
        }

        // Drain: completing everything queued releases everything held.
        let mut completed: HashSet<String> = HashSet::new();
        while let Some(next) = queued.pop() {
            if !completed.insert(next.id.clone()) {
                continue;
            }
            let mut enqueue = |s: Subtask, _o: EnqueueOpts| queued.push(s);
            tracker.record_completion_and_release(&next.id, "out", &mut enqueue);
        }

        prop_assert_eq!(tracker.held_len(), 0);
        prop_assert_eq!(completed.len(), batch.len());
    }

    /// Nonce slots burn for exactly the TTL.
    #[test]
    fn nonce_replay_window(offsets in proptest::collection::vec(0u64..1_000_000, 1..30)) {
        let ttl = 300_000;
        let store = InMemoryNonceStore::with_ttl(ttl);
        let base = 1_000_000;
        prop_assert!(!store.seen("agent", "n", base));
        for offset in offsets {
            let seen = store.seen("agent", "n", base + offset);
            // A probe inside the TTL of the previous burn is a replay; one
            // past it re-burns the slot.
            prop_assert_eq!(seen, offset <= ttl);
            if !seen {
                break;
            }
        }
    }

    /// A commit appears only once `floor(K/2)+1` distinct signers exist.
    #[test]
    fn stats_quorum_threshold(known in 1usize..7, signers in 0usize..7) {
        let signers = signers.min(known);
        let keypairs: Vec<Arc<Ed25519KeyPair>> =
            (0..known).map(|_| Arc::new(Ed25519KeyPair::generate())).collect();
        let services: Vec<ChainService> = keypairs
            .iter()
            .enumerate()
            .map(|(i, kp)| ChainService::new(&format!("coord-{i}"), kp.clone(), Arc::new(StatsLedger::new())))
            .collect();

        // Coordinator 0 seeds a record every signer replicates.
        services[0]
            .append(draft(ChainEventType::TaskEnqueue, "T1".into()), 1)
            .unwrap();
        let seed = services[0].stats().snapshot();

        struct Keys(Vec<(String, shared_crypto::Ed25519PublicKey)>);
        impl cm_03_ordering_chain::KeyDirectory for Keys {
            fn public_key(&self, id: &str) -> Option<shared_crypto::Ed25519PublicKey> {
                self.0.iter().find(|(k, _)| k == id).map(|(_, v)| *v)
            }
        }
        let keys = Keys(
            keypairs
                .iter()
                .enumerate()
                .map(|(i, kp)| (format!("coord-{i}"), kp.public_key()))
                .collect(),
        );

        // `signers` coordinators sign the same candidate; collect their
        // signature records into coordinator 0's ledger.
        for i in 1..signers {
            services[i].stats().ingest(&seed, &keys).unwrap();
            services[i].sign_and_maybe_commit(known, 2).unwrap();
            let sigs: Vec<_> = services[i]
                .snapshot()
                .into_iter()
                .filter(|r| r.event_type == ChainEventType::StatsCheckpointSignature)
                .collect();
            services[0].stats().ingest(&sigs, &keys).unwrap();
        }

        let threshold = known / 2 + 1;
        if signers == 0 {
            return Ok(());
        }
        // Coordinator 0 signs last; its tally is now `signers`.
        services[0].sign_and_maybe_commit(known, 3).unwrap();

        let candidate = seed[0].hash.clone();
        let tally = checkpoint::tally(services[0].stats(), &candidate);
        prop_assert_eq!(tally.distinct_signers, signers);
        prop_assert_eq!(tally.committed, signers >= threshold);
    }
}

/// Claim atomicity under real parallelism: N threads race for one subtask.
#[test]
fn concurrent_claims_have_one_winner() {
    let service = Arc::new(QueueService::new(
        QueueConfig::default(),
        Arc::new(FixedTimeSource::at(1_000)),
    ));
    service.enqueue_subtask(subtask("S1".into(), vec![]), EnqueueOpts::default());

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(std::thread::spawn(move || {
            service.claim(&format!("agent-{i}"), None).map(|s| s.id)
        }));
    }
    let wins: Vec<String> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(wins, vec!["S1".to_string()]);
}
