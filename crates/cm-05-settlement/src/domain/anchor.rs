//! # Anchor Coordination
//!
//! One coordinator per epoch submits the checkpoint hash to the settlement
//! chain. Leadership is deterministic from local peer tables alone: the
//! lexicographically smallest reachable peer id (self included) leads, so no
//! extra election messages are needed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Anchor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    /// Submitted, not yet observed on the settlement chain.
    Pending,
    /// Observed on the settlement chain.
    Anchored,
}

/// Record of an anchor intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub anchor_id: String,
    pub epoch_id: String,
    pub checkpoint_hash: String,
    pub network: String,
    pub tx_ref: String,
    pub status: AnchorStatus,
}

/// Deterministic leader: smallest peer id among the reachable set.
pub fn elect_leader<'a>(mut peer_ids: Vec<&'a str>) -> Option<&'a str> {
    peer_ids.sort_unstable();
    peer_ids.first().copied()
}

/// In-process store of anchor records.
#[derive(Default)]
pub struct AnchorStore {
    anchors: Mutex<Vec<AnchorRecord>>,
}

impl AnchorStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an anchor intent as `pending`.
    pub fn record_intent(
        &self,
        epoch_id: &str,
        checkpoint_hash: &str,
        network: &str,
        tx_ref: &str,
    ) -> AnchorRecord {
        let record = AnchorRecord {
            anchor_id: uuid::Uuid::new_v4().to_string(),
            epoch_id: epoch_id.to_string(),
            checkpoint_hash: checkpoint_hash.to_string(),
            network: network.to_string(),
            tx_ref: tx_ref.to_string(),
            status: AnchorStatus::Pending,
        };
        self.anchors.lock().push(record.clone());
        record
    }

    /// Confirmation from the settlement chain.
    pub fn confirm(&self, anchor_id: &str) -> bool {
        self.set_status(anchor_id, AnchorStatus::Anchored)
    }

    /// Reorg demotion: the transaction fell out of the longest chain.
    pub fn demote(&self, anchor_id: &str) -> bool {
        self.set_status(anchor_id, AnchorStatus::Pending)
    }

    fn set_status(&self, anchor_id: &str, status: AnchorStatus) -> bool {
        let mut anchors = self.anchors.lock();
        match anchors.iter_mut().find(|a| a.anchor_id == anchor_id) {
            Some(anchor) => {
                anchor.status = status;
                true
            }
            None => false,
        }
    }

    /// True when a checkpoint hash already has an anchor record.
    pub fn has_anchor_for(&self, checkpoint_hash: &str) -> bool {
        self.anchors
            .lock()
            .iter()
            .any(|a| a.checkpoint_hash == checkpoint_hash)
    }

    /// Anchor for a checkpoint hash, if any.
    pub fn find_by_checkpoint(&self, checkpoint_hash: &str) -> Option<AnchorRecord> {
        self.anchors
            .lock()
            .iter()
            .find(|a| a.checkpoint_hash == checkpoint_hash)
            .cloned()
    }

    /// All records.
    pub fn all(&self) -> Vec<AnchorRecord> {
        self.anchors.lock().clone()
    }

    /// Records currently `anchored` (the reorg re-check set).
    pub fn anchored(&self) -> Vec<AnchorRecord> {
        self.anchors
            .lock()
            .iter()
            .filter(|a| a.status == AnchorStatus::Anchored)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_is_lexicographically_smallest() {
        assert_eq!(elect_leader(vec!["b", "a", "c"]), Some("a"));
        assert_eq!(elect_leader(vec!["zeta"]), Some("zeta"));
        assert_eq!(elect_leader(Vec::new()), None);
    }

    #[test]
    fn anchor_lifecycle_with_reorg() {
        let store = AnchorStore::new();
        let record = store.record_intent("epoch-1", "hash-1", "testnet", "tx-9");
        assert_eq!(record.status, AnchorStatus::Pending);

        assert!(store.confirm(&record.anchor_id));
        assert_eq!(store.anchored().len(), 1);

        assert!(store.demote(&record.anchor_id));
        assert!(store.anchored().is_empty());
        assert!(store.has_anchor_for("hash-1"));
    }
}
