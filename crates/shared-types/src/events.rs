//! # Ledger Record Types
//!
//! Three independent hash chains share these shapes:
//!
//! - **Ordering chain**: per-coordinator log of queue events ([`ChainRecord`])
//! - **Quorum ledger**: cross-coordinator epoch records ([`QuorumRecord`])
//! - **Blacklist chain**: signed agent bans ([`BlacklistRecord`])
//!
//! Record hashes are SHA-256 over the canonical JSON of the record minus its
//! `hash` and `signature` fields; chain linkage starts at `"GENESIS"`.

use serde::{Deserialize, Serialize};

/// Sentinel `prev_hash` for the first record of every chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// Event types recorded in the ordering chain (and mirrored to stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainEventType {
    TaskEnqueue,
    TaskClaim,
    TaskComplete,
    NodeApproval,
    NodeValidation,
    EarningsAccrual,
    StatsCheckpointSignature,
    StatsCheckpointCommit,
}

/// A draft event handed to the ordering chain's `append`.
///
/// The chain fills `sequence`, `prev_hash`, `issued_at_ms`, `hash`, and
/// `signature`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDraft {
    pub event_type: ChainEventType,
    pub task_id: String,
    #[serde(default)]
    pub subtask_id: Option<String>,
    pub actor_id: String,
    #[serde(default)]
    pub checkpoint_height: Option<u64>,
    #[serde(default)]
    pub checkpoint_hash: Option<String>,
    #[serde(default)]
    pub payload_json: Option<String>,
}

/// One link of the ordering chain / stats ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRecord {
    pub id: String,
    pub event_type: ChainEventType,
    pub task_id: String,
    #[serde(default)]
    pub subtask_id: Option<String>,
    pub actor_id: String,
    pub sequence: u64,
    pub issued_at_ms: u64,
    pub prev_hash: String,
    pub coordinator_id: String,
    #[serde(default)]
    pub checkpoint_height: Option<u64>,
    #[serde(default)]
    pub checkpoint_hash: Option<String>,
    #[serde(default)]
    pub payload_json: Option<String>,
    /// SHA-256 hex over the canonical JSON of all fields above.
    pub hash: String,
    /// Hex Ed25519 signature over `hash` by the owning coordinator.
    pub signature: String,
}

impl ChainRecord {
    /// The record with `hash`/`signature` blanked, for recomputing the hash.
    pub fn hashable_view(&self) -> HashableChainRecord<'_> {
        HashableChainRecord {
            id: &self.id,
            event_type: self.event_type,
            task_id: &self.task_id,
            subtask_id: self.subtask_id.as_deref(),
            actor_id: &self.actor_id,
            sequence: self.sequence,
            issued_at_ms: self.issued_at_ms,
            prev_hash: &self.prev_hash,
            coordinator_id: &self.coordinator_id,
            checkpoint_height: self.checkpoint_height,
            checkpoint_hash: self.checkpoint_hash.as_deref(),
            payload_json: self.payload_json.as_deref(),
        }
    }
}

/// Borrowed view of a [`ChainRecord`] without `hash` and `signature`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashableChainRecord<'a> {
    pub id: &'a str,
    pub event_type: ChainEventType,
    pub task_id: &'a str,
    pub subtask_id: Option<&'a str>,
    pub actor_id: &'a str,
    pub sequence: u64,
    pub issued_at_ms: u64,
    pub prev_hash: &'a str,
    pub coordinator_id: &'a str,
    pub checkpoint_height: Option<u64>,
    pub checkpoint_hash: Option<&'a str>,
    pub payload_json: Option<&'a str>,
}

/// Record types of the quorum ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumRecordType {
    IssuanceProposal,
    IssuanceVote,
    IssuanceCommit,
    IssuanceCheckpoint,
}

/// One link of the quorum ledger. Append order is per-coordinator; the
/// logical chain is per-epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuorumRecord {
    pub record_id: String,
    pub record_type: QuorumRecordType,
    pub epoch_id: String,
    pub coordinator_id: String,
    pub prev_hash: String,
    pub hash: String,
    pub payload_json: String,
    pub signature: String,
    pub created_at_ms: u64,
}

/// Machine-readable grounds for blacklisting an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistReasonCode {
    DosBehavior,
    InvalidResults,
    SignatureAbuse,
    OperatorAction,
}

impl BlacklistReasonCode {
    /// Reason codes raised by automated policy engines must carry a valid
    /// reporter signature; operator action is vouched by the coordinator.
    pub fn requires_reporter_signature(&self) -> bool {
        !matches!(self, BlacklistReasonCode::OperatorAction)
    }
}

/// One link of the blacklist chain (independent of the ordering chain).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistRecord {
    pub event_id: String,
    pub agent_id: String,
    pub reason_code: BlacklistReasonCode,
    pub reason: String,
    /// SHA-256 hex of the evidence blob backing the ban.
    pub evidence_hash_sha256: String,
    pub reporter_id: String,
    #[serde(default)]
    pub reporter_signature: Option<String>,
    /// Reporter's Ed25519 key, PEM. Hash-covered so receivers can re-verify
    /// the reporter claim on machine-raised reason codes.
    #[serde(default)]
    pub reporter_public_key_pem: Option<String>,
    pub source_coordinator_id: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
    pub prev_event_hash: String,
    pub event_hash: String,
    pub coordinator_signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ChainEventType::StatsCheckpointSignature).unwrap(),
            "\"stats_checkpoint_signature\""
        );
        assert_eq!(
            serde_json::to_string(&QuorumRecordType::IssuanceProposal).unwrap(),
            "\"issuance_proposal\""
        );
    }

    #[test]
    fn hashable_view_omits_hash_and_signature() {
        let record = ChainRecord {
            id: "r1".into(),
            event_type: ChainEventType::TaskEnqueue,
            task_id: "T1".into(),
            subtask_id: None,
            actor_id: "submitter".into(),
            sequence: 1,
            issued_at_ms: 42,
            prev_hash: GENESIS_HASH.into(),
            coordinator_id: "coord-a".into(),
            checkpoint_height: None,
            checkpoint_hash: None,
            payload_json: None,
            hash: "deadbeef".into(),
            signature: "cafe".into(),
        };
        let json = serde_json::to_string(&record.hashable_view()).unwrap();
        assert!(!json.contains("deadbeef"));
        assert!(!json.contains("cafe"));
        assert!(json.contains("\"prevHash\":\"GENESIS\""));
    }
}
