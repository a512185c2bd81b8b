//! # Chain Service
//!
//! Owner of the ordering chain lock. Every append mirrors into the stats
//! ledger so projections and replication see the record immediately.

use crate::domain::{ChainVerifyError, OrderingChain};
use crate::stats::checkpoint;
use crate::stats::ledger::StatsLedger;
use parking_lot::Mutex;
use shared_crypto::Ed25519KeyPair;
use shared_types::{ChainDraft, ChainEventType, ChainRecord};
use std::sync::Arc;
use tracing::info;

/// Credits accrued to the owning account per completed subtask.
pub const TASK_REWARD_CREDITS: u64 = 5;

/// Ordering chain + stats mirror behind one service.
pub struct ChainService {
    coordinator_id: String,
    chain: Mutex<OrderingChain>,
    stats: Arc<StatsLedger>,
}

impl ChainService {
    /// New service for `coordinator_id`.
    pub fn new(coordinator_id: &str, keypair: Arc<Ed25519KeyPair>, stats: Arc<StatsLedger>) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            chain: Mutex::new(OrderingChain::new(coordinator_id, keypair)),
            stats,
        }
    }

    /// The owning coordinator id.
    pub fn coordinator_id(&self) -> &str {
        &self.coordinator_id
    }

    /// Append a queue event and mirror it to stats.
    ///
    /// A failure here is fatal for the calling operation (HTTP 500): the
    /// chain must never skip a sequence number.
    pub fn append(&self, draft: ChainDraft, now_ms: u64) -> Result<ChainRecord, ChainVerifyError> {
        let record = self.chain.lock().append(draft, now_ms)?;
        self.stats.mirror_local(&record);
        Ok(record)
    }

    /// Copy of the ordering chain.
    pub fn snapshot(&self) -> Vec<ChainRecord> {
        self.chain.lock().snapshot()
    }

    /// Ordering chain length.
    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    /// True when the chain has no records.
    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }

    /// Newest ordering record.
    pub fn head(&self) -> Option<ChainRecord> {
        self.chain.lock().head().cloned()
    }

    /// Re-verify the whole local chain (`GET /ledger/verify`).
    pub fn verify_own_chain(&self) -> Result<(), ChainVerifyError> {
        self.chain.lock().verify_self()
    }

    /// The shared stats ledger.
    pub fn stats(&self) -> &Arc<StatsLedger> {
        &self.stats
    }

    /// Sign the current stats head if we have not already, then commit when
    /// quorum is reached. Returns the commit record when one was appended.
    pub fn sign_and_maybe_commit(
        &self,
        known_coordinators: usize,
        now_ms: u64,
    ) -> Result<Option<ChainRecord>, ChainVerifyError> {
        let Some((checkpoint_hash, height)) = checkpoint::current_candidate(&self.stats) else {
            return Ok(None);
        };

        if !checkpoint::already_signed(&self.stats, &checkpoint_hash, &self.coordinator_id) {
            self.append(
                ChainDraft {
                    event_type: ChainEventType::StatsCheckpointSignature,
                    task_id: "-".into(),
                    subtask_id: None,
                    actor_id: self.coordinator_id.clone(),
                    checkpoint_height: Some(height),
                    checkpoint_hash: Some(checkpoint_hash.clone()),
                    payload_json: None,
                },
                now_ms,
            )?;
        }

        let tally = checkpoint::tally(&self.stats, &checkpoint_hash);
        if tally.committed || tally.distinct_signers < checkpoint::quorum_threshold(known_coordinators)
        {
            return Ok(None);
        }

        let commit = self.append(
            ChainDraft {
                event_type: ChainEventType::StatsCheckpointCommit,
                task_id: "-".into(),
                subtask_id: None,
                actor_id: self.coordinator_id.clone(),
                checkpoint_height: Some(height),
                checkpoint_hash: Some(checkpoint_hash.clone()),
                payload_json: None,
            },
            now_ms,
        )?;
        info!(
            checkpoint_hash = %checkpoint_hash,
            signers = tally.distinct_signers,
            "stats checkpoint committed"
        );
        Ok(Some(commit))
    }
}
