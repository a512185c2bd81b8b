//! # Ordering Chain
//!
//! Append-only signed log of queue events. `append` is not re-entrant; the
//! service serializes calls behind a single mutex so a persistence failure
//! can never leave a gap in `sequence`.

use super::errors::ChainVerifyError;
use shared_crypto::{canonical_json, sha256_hex, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{ChainDraft, ChainRecord, GENESIS_HASH};
use std::sync::Arc;

/// Per-coordinator hash-chained signed log.
pub struct OrderingChain {
    coordinator_id: String,
    keypair: Arc<Ed25519KeyPair>,
    records: Vec<ChainRecord>,
}

impl OrderingChain {
    /// Create an empty chain owned by `coordinator_id`.
    pub fn new(coordinator_id: &str, keypair: Arc<Ed25519KeyPair>) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            keypair,
            records: Vec::new(),
        }
    }

    /// Restore a chain from persisted records (restart path). The records
    /// are trusted here; callers verify first when they come from storage.
    pub fn restore(
        coordinator_id: &str,
        keypair: Arc<Ed25519KeyPair>,
        records: Vec<ChainRecord>,
    ) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            keypair,
            records,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest record, if any.
    pub fn head(&self) -> Option<&ChainRecord> {
        self.records.last()
    }

    /// Copy of all records.
    pub fn snapshot(&self) -> Vec<ChainRecord> {
        self.records.clone()
    }

    /// Append a queue event: fills sequence, linkage, timestamp, hash, and
    /// signature, pushes, and returns the finished record.
    pub fn append(&mut self, draft: ChainDraft, now_ms: u64) -> Result<ChainRecord, ChainVerifyError> {
        let sequence = self.records.len() as u64 + 1;
        let prev_hash = self
            .records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut record = ChainRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: draft.event_type,
            task_id: draft.task_id,
            subtask_id: draft.subtask_id,
            actor_id: draft.actor_id,
            sequence,
            issued_at_ms: now_ms,
            prev_hash,
            coordinator_id: self.coordinator_id.clone(),
            checkpoint_height: draft.checkpoint_height,
            checkpoint_hash: draft.checkpoint_hash,
            payload_json: draft.payload_json,
            hash: String::new(),
            signature: String::new(),
        };

        let canonical = canonical_json(&record.hashable_view())
            .map_err(|e| ChainVerifyError::Canonicalization(e.to_string()))?;
        record.hash = sha256_hex(canonical.as_bytes());
        record.signature = self.keypair.sign(record.hash.as_bytes()).to_hex();

        self.records.push(record.clone());
        Ok(record)
    }

    /// Walk a chain, returning the first failure among sequence, linkage,
    /// hash, and signature checks.
    pub fn verify(records: &[ChainRecord], public_key: &Ed25519PublicKey) -> Result<(), ChainVerifyError> {
        let mut prev_hash: Option<&str> = None;
        for (index, record) in records.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if record.sequence != expected_seq {
                return Err(ChainVerifyError::InvalidSequence {
                    index,
                    expected: expected_seq,
                    actual: record.sequence,
                });
            }

            let expected_prev = prev_hash.unwrap_or(GENESIS_HASH);
            if record.prev_hash != expected_prev {
                return Err(ChainVerifyError::InvalidPrevHash { index });
            }

            let canonical = canonical_json(&record.hashable_view())
                .map_err(|e| ChainVerifyError::Canonicalization(e.to_string()))?;
            if sha256_hex(canonical.as_bytes()) != record.hash {
                return Err(ChainVerifyError::HashMismatch { index });
            }

            Self::verify_record_signature(record, public_key)
                .map_err(|_| ChainVerifyError::InvalidSignature { index })?;

            prev_hash = Some(&record.hash);
        }
        Ok(())
    }

    /// Verify this chain against its own signing key.
    pub fn verify_self(&self) -> Result<(), ChainVerifyError> {
        Self::verify(&self.records, &self.keypair.public_key())
    }

    /// Verify one record's hash and signature in isolation (stats ingest
    /// path, where remote chains arrive piecewise and per-coordinator).
    pub fn verify_record(
        record: &ChainRecord,
        public_key: &Ed25519PublicKey,
    ) -> Result<(), ChainVerifyError> {
        let canonical = canonical_json(&record.hashable_view())
            .map_err(|e| ChainVerifyError::Canonicalization(e.to_string()))?;
        if sha256_hex(canonical.as_bytes()) != record.hash {
            return Err(ChainVerifyError::HashMismatch { index: 0 });
        }
        Self::verify_record_signature(record, public_key)
            .map_err(|_| ChainVerifyError::InvalidSignature { index: 0 })
    }

    fn verify_record_signature(
        record: &ChainRecord,
        public_key: &Ed25519PublicKey,
    ) -> Result<(), shared_crypto::CryptoError> {
        let signature = Ed25519Signature::from_hex(&record.signature)?;
        public_key.verify(record.hash.as_bytes(), &signature)
    }
}
