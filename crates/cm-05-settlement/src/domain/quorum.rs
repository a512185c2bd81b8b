//! # Quorum Ledger
//!
//! Per-coordinator append-only hash chain of issuance records. Append order
//! is local; the logical chain readers care about is per-epoch, so votes are
//! tallied by `(epoch_id, coordinator_id)` with duplicates ignored.
//!
//! A gossiped record counts toward a tally only after its hash recomputes
//! and its signature verifies against the key registered for the
//! coordinator it claims to be from. The quorum is a majority of *known*
//! coordinators; an unverified `coordinator_id` string must never reach a
//! vote set.

use super::errors::SettlementError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use shared_crypto::{canonical_json, sha256_hex, Ed25519KeyPair, Ed25519Signature};
use shared_types::{KeyDirectory, QuorumRecord, QuorumRecordType, GENESIS_HASH};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashableQuorumRecord<'a> {
    record_id: &'a str,
    record_type: QuorumRecordType,
    epoch_id: &'a str,
    coordinator_id: &'a str,
    prev_hash: &'a str,
    payload_json: &'a str,
    created_at_ms: u64,
}

/// The quorum ledger.
pub struct QuorumLedger {
    coordinator_id: String,
    keypair: Arc<Ed25519KeyPair>,
    records: Mutex<Vec<QuorumRecord>>,
    seen: Mutex<HashSet<String>>,
    /// Approve votes per epoch, by voting coordinator.
    votes: DashMap<String, HashSet<String>>,
}

impl QuorumLedger {
    /// Empty ledger owned by `coordinator_id`.
    pub fn new(coordinator_id: &str, keypair: Arc<Ed25519KeyPair>) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            keypair,
            records: Mutex::new(Vec::new()),
            seen: Mutex::new(HashSet::new()),
            votes: DashMap::new(),
        }
    }

    /// Append a locally originated record: links, hashes, signs.
    pub fn append(
        &self,
        record_type: QuorumRecordType,
        epoch_id: &str,
        payload_json: String,
        now_ms: u64,
    ) -> Result<QuorumRecord, SettlementError> {
        let mut records = self.records.lock();
        let prev_hash = records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let record_id = uuid::Uuid::new_v4().to_string();

        let hashable = HashableQuorumRecord {
            record_id: &record_id,
            record_type,
            epoch_id,
            coordinator_id: &self.coordinator_id,
            prev_hash: &prev_hash,
            payload_json: &payload_json,
            created_at_ms: now_ms,
        };
        let hash = sha256_hex(
            canonical_json(&hashable)
                .map_err(|e| SettlementError::RecordBuild(e.to_string()))?
                .as_bytes(),
        );
        let signature = self.keypair.sign(hash.as_bytes()).to_hex();

        let record = QuorumRecord {
            record_id: record_id.clone(),
            record_type,
            epoch_id: epoch_id.to_string(),
            coordinator_id: self.coordinator_id.clone(),
            prev_hash,
            hash,
            payload_json,
            signature,
            created_at_ms: now_ms,
        };
        records.push(record.clone());
        drop(records);

        self.seen.lock().insert(record_id);
        if record_type == QuorumRecordType::IssuanceVote {
            self.count_vote(epoch_id, &self.coordinator_id);
        }
        Ok(record)
    }

    /// Ingest a gossiped record. The hash must recompute from the record's
    /// fields and the signature must verify against the registered key of
    /// the claimed `coordinator_id` before anything is persisted or
    /// tallied. Deduped by record id; a second vote from the same
    /// coordinator in the same epoch changes nothing.
    pub fn ingest_remote(
        &self,
        record: &QuorumRecord,
        keys: &dyn KeyDirectory,
    ) -> Result<(), SettlementError> {
        let hashable = HashableQuorumRecord {
            record_id: &record.record_id,
            record_type: record.record_type,
            epoch_id: &record.epoch_id,
            coordinator_id: &record.coordinator_id,
            prev_hash: &record.prev_hash,
            payload_json: &record.payload_json,
            created_at_ms: record.created_at_ms,
        };
        let recomputed = sha256_hex(
            canonical_json(&hashable)
                .map_err(|e| SettlementError::RecordBuild(e.to_string()))?
                .as_bytes(),
        );
        if recomputed != record.hash {
            return Err(SettlementError::SignatureInvalid);
        }

        let key = keys.public_key(&record.coordinator_id).ok_or_else(|| {
            SettlementError::CoordinatorNotApproved(record.coordinator_id.clone())
        })?;
        let signature = Ed25519Signature::from_hex(&record.signature)
            .map_err(|_| SettlementError::SignatureInvalid)?;
        key.verify(record.hash.as_bytes(), &signature)
            .map_err(|_| SettlementError::SignatureInvalid)?;

        if !self.seen.lock().insert(record.record_id.clone()) {
            return Ok(());
        }
        self.records.lock().push(record.clone());
        if record.record_type == QuorumRecordType::IssuanceVote {
            self.count_vote(&record.epoch_id, &record.coordinator_id);
        }
        Ok(())
    }

    fn count_vote(&self, epoch_id: &str, coordinator_id: &str) {
        self.votes
            .entry(epoch_id.to_string())
            .or_default()
            .insert(coordinator_id.to_string());
    }

    /// Distinct approve votes for an epoch.
    pub fn vote_count(&self, epoch_id: &str) -> usize {
        self.votes.get(epoch_id).map(|v| v.len()).unwrap_or(0)
    }

    /// True when a commit record exists for the epoch.
    pub fn has_commit(&self, epoch_id: &str) -> bool {
        self.records.lock().iter().any(|r| {
            r.record_type == QuorumRecordType::IssuanceCommit && r.epoch_id == epoch_id
        })
    }

    /// Full snapshot.
    pub fn snapshot(&self) -> Vec<QuorumRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Ed25519PublicKey;

    struct StaticKeys(Vec<(String, Ed25519PublicKey)>);

    impl KeyDirectory for StaticKeys {
        fn public_key(&self, coordinator_id: &str) -> Option<Ed25519PublicKey> {
            self.0
                .iter()
                .find(|(id, _)| id == coordinator_id)
                .map(|(_, key)| *key)
        }
    }

    fn ledger(id: &str) -> QuorumLedger {
        QuorumLedger::new(id, Arc::new(Ed25519KeyPair::generate()))
    }

    fn two_ledgers() -> (QuorumLedger, QuorumLedger, StaticKeys) {
        let kp_a = Arc::new(Ed25519KeyPair::generate());
        let kp_b = Arc::new(Ed25519KeyPair::generate());
        let keys = StaticKeys(vec![
            ("coord-a".to_string(), kp_a.public_key()),
            ("coord-b".to_string(), kp_b.public_key()),
        ]);
        (
            QuorumLedger::new("coord-a", kp_a),
            QuorumLedger::new("coord-b", kp_b),
            keys,
        )
    }

    #[test]
    fn local_chain_links() {
        let q = ledger("coord-a");
        let first = q
            .append(QuorumRecordType::IssuanceProposal, "epoch-1", "{}".into(), 1)
            .unwrap();
        assert_eq!(first.prev_hash, GENESIS_HASH);
        let second = q
            .append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 2)
            .unwrap();
        assert_eq!(second.prev_hash, first.hash);
    }

    #[test]
    fn duplicate_votes_are_ignored() {
        let (a, b, keys) = two_ledgers();

        a.append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 1)
            .unwrap();
        assert_eq!(a.vote_count("epoch-1"), 1);

        let b_vote = b
            .append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 2)
            .unwrap();
        a.ingest_remote(&b_vote, &keys).unwrap();
        a.ingest_remote(&b_vote, &keys).unwrap();
        assert_eq!(a.vote_count("epoch-1"), 2);

        // A second distinct record from the same voter still counts once.
        let b_again = b
            .append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 3)
            .unwrap();
        a.ingest_remote(&b_again, &keys).unwrap();
        assert_eq!(a.vote_count("epoch-1"), 2);
    }

    #[test]
    fn vote_from_unregistered_coordinator_is_rejected() {
        let (a, b, _) = two_ledgers();
        let vote = b
            .append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 1)
            .unwrap();
        let empty = StaticKeys(Vec::new());
        assert!(matches!(
            a.ingest_remote(&vote, &empty),
            Err(SettlementError::CoordinatorNotApproved(_))
        ));
        assert_eq!(a.vote_count("epoch-1"), 0);
    }

    #[test]
    fn forged_coordinator_id_cannot_stuff_the_ballot() {
        let (a, b, keys) = two_ledgers();
        // b fabricates votes under ids it does not hold the keys for.
        let mut vote = b
            .append(QuorumRecordType::IssuanceVote, "epoch-1", "{}".into(), 1)
            .unwrap();
        vote.coordinator_id = "coord-a".into();
        assert_eq!(
            a.ingest_remote(&vote, &keys).unwrap_err(),
            SettlementError::SignatureInvalid
        );

        // Re-hashing under the stolen id still fails: b cannot produce
        // coord-a's signature over the new hash.
        let hashable = HashableQuorumRecord {
            record_id: &vote.record_id,
            record_type: vote.record_type,
            epoch_id: &vote.epoch_id,
            coordinator_id: &vote.coordinator_id,
            prev_hash: &vote.prev_hash,
            payload_json: &vote.payload_json,
            created_at_ms: vote.created_at_ms,
        };
        vote.hash = sha256_hex(canonical_json(&hashable).unwrap().as_bytes());
        assert_eq!(
            a.ingest_remote(&vote, &keys).unwrap_err(),
            SettlementError::SignatureInvalid
        );
        assert_eq!(a.vote_count("epoch-1"), 0);
    }
}
