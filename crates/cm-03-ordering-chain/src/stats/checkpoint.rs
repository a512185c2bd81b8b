//! # Stats Checkpoints
//!
//! A checkpoint is the stats-ledger hash at position N. Coordinators sign
//! the head they observe; when distinct signers for one checkpoint hash
//! reach `floor(known/2)+1`, a single commit record finalizes it.

use crate::stats::ledger::StatsLedger;
use shared_types::{ChainEventType, ChainRecord};
use std::collections::HashSet;

/// Signature count for one checkpoint hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointTally {
    pub checkpoint_hash: String,
    pub distinct_signers: usize,
    pub committed: bool,
}

/// Majority threshold over `known_coordinators`.
pub fn quorum_threshold(known_coordinators: usize) -> usize {
    known_coordinators / 2 + 1
}

/// Count distinct signers and committedness for `checkpoint_hash`.
pub fn tally(ledger: &StatsLedger, checkpoint_hash: &str) -> CheckpointTally {
    let records = ledger.snapshot();
    let mut signers: HashSet<&str> = HashSet::new();
    let mut committed = false;
    for record in &records {
        if record.checkpoint_hash.as_deref() != Some(checkpoint_hash) {
            continue;
        }
        match record.event_type {
            ChainEventType::StatsCheckpointSignature => {
                signers.insert(record.actor_id.as_str());
            }
            ChainEventType::StatsCheckpointCommit => committed = true,
            _ => {}
        }
    }
    CheckpointTally {
        checkpoint_hash: checkpoint_hash.to_string(),
        distinct_signers: signers.len(),
        committed,
    }
}

/// True when `signer` already signed `checkpoint_hash`.
pub fn already_signed(ledger: &StatsLedger, checkpoint_hash: &str, signer: &str) -> bool {
    ledger.snapshot().iter().any(|record| {
        record.event_type == ChainEventType::StatsCheckpointSignature
            && record.checkpoint_hash.as_deref() == Some(checkpoint_hash)
            && record.actor_id == signer
    })
}

/// The current checkpoint candidate: hash and height of the stats head,
/// skipping checkpoint bookkeeping records so signing does not chase its own
/// tail.
pub fn current_candidate(ledger: &StatsLedger) -> Option<(String, u64)> {
    let records = ledger.snapshot();
    records
        .iter()
        .enumerate()
        .rev()
        .find(|(_, r)| {
            !matches!(
                r.event_type,
                ChainEventType::StatsCheckpointSignature | ChainEventType::StatsCheckpointCommit
            )
        })
        .map(|(index, r)| (r.hash.clone(), index as u64 + 1))
}

/// Convenience: does `checkpoint_hash` have a commit record yet?
pub fn has_commit(ledger: &StatsLedger, checkpoint_hash: &str) -> bool {
    ledger.snapshot().iter().any(|record: &ChainRecord| {
        record.event_type == ChainEventType::StatsCheckpointCommit
            && record.checkpoint_hash.as_deref() == Some(checkpoint_hash)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_floor_half_plus_one() {
        assert_eq!(quorum_threshold(1), 1);
        assert_eq!(quorum_threshold(2), 2);
        assert_eq!(quorum_threshold(3), 2);
        assert_eq!(quorum_threshold(4), 3);
        assert_eq!(quorum_threshold(5), 3);
    }
}
