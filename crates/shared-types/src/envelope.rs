//! # Mesh Message Envelope
//!
//! The sole wrapper for coordinator-to-coordinator (and coordinator-to-agent
//! push) gossip. The Ed25519 signature covers the canonical JSON of every
//! field except `signature` itself, so envelopes survive proxy re-encoding
//! and field reordering.

use crate::entities::{NetworkMode, PeerRole, Subtask};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_crypto::{canonical_json, CryptoError, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Default envelope time-to-live.
pub const MESH_DEFAULT_TTL_MS: u64 = 60_000;

/// Gossip message types carried by [`MeshMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshMessageType {
    PeerExchange,
    CapabilityAnnounce,
    CapabilitySummary,
    TaskOffer,
    TaskClaim,
    ResultAnnounce,
    BlacklistUpdate,
    IssuanceProposal,
    IssuanceVote,
    IssuanceCommit,
    IssuanceCheckpoint,
}

impl MeshMessageType {
    /// Types accepted from peers we have never seen: these are the
    /// introduction mechanism, everything else requires a known signer.
    pub fn allowed_from_unknown_peer(&self) -> bool {
        matches!(
            self,
            MeshMessageType::PeerExchange | MeshMessageType::CapabilityAnnounce
        )
    }
}

/// Signed gossip envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MeshMessageType,
    pub from_peer_id: String,
    pub issued_at_ms: u64,
    pub ttl_ms: u64,
    pub payload: Value,
    /// Hex Ed25519 signature over the canonical JSON of all other fields.
    pub signature: String,
}

/// The envelope minus its signature, used to build the signed byte form.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsignedMeshMessage<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    message_type: MeshMessageType,
    from_peer_id: &'a str,
    issued_at_ms: u64,
    ttl_ms: u64,
    payload: &'a Value,
}

impl MeshMessage {
    /// Build and sign an envelope.
    pub fn signed(
        keypair: &Ed25519KeyPair,
        message_type: MeshMessageType,
        from_peer_id: &str,
        issued_at_ms: u64,
        payload: Value,
    ) -> Result<Self, CryptoError> {
        let id = uuid::Uuid::new_v4().to_string();
        let unsigned = UnsignedMeshMessage {
            id: &id,
            message_type,
            from_peer_id,
            issued_at_ms,
            ttl_ms: MESH_DEFAULT_TTL_MS,
            payload: &payload,
        };
        let bytes = canonical_json(&unsigned)?;
        let signature = keypair.sign(bytes.as_bytes()).to_hex();
        Ok(Self {
            id,
            message_type,
            from_peer_id: from_peer_id.to_string(),
            issued_at_ms,
            ttl_ms: MESH_DEFAULT_TTL_MS,
            payload,
            signature,
        })
    }

    /// Verify the envelope signature against the sender's public key.
    pub fn verify_signature(&self, public_key: &Ed25519PublicKey) -> Result<(), CryptoError> {
        let unsigned = UnsignedMeshMessage {
            id: &self.id,
            message_type: self.message_type,
            from_peer_id: &self.from_peer_id,
            issued_at_ms: self.issued_at_ms,
            ttl_ms: self.ttl_ms,
            payload: &self.payload,
        };
        let bytes = canonical_json(&unsigned)?;
        let signature = Ed25519Signature::from_hex(&self.signature)?;
        public_key.verify(bytes.as_bytes(), &signature)
    }

    /// True when the envelope has outlived its TTL.
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.issued_at_ms) > self.ttl_ms
    }
}

// =============================================================================
// GOSSIP PAYLOADS
// =============================================================================

/// One peer entry inside a `peer_exchange` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAdvert {
    pub peer_id: String,
    pub public_key: String,
    pub url: String,
    pub network_mode: NetworkMode,
    pub role: PeerRole,
    pub last_seen_ms: u64,
}

/// `peer_exchange`: the mutual-introduction gossip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerExchangePayload {
    pub peers: Vec<PeerAdvert>,
}

/// `capability_announce`: an agent/phone peer advertising what it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityAnnouncePayload {
    pub models: Vec<String>,
    pub max_concurrent_tasks: u32,
    pub device_type: String,
}

/// `capability_summary`: a coordinator's aggregated agent profile.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummaryPayload {
    pub coordinator_id: String,
    pub live_agents: u32,
    pub total_max_concurrent: u32,
    pub models: Vec<String>,
}

/// `task_offer`: a locally enqueued subtask offered to the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOfferPayload {
    pub subtask: Subtask,
    pub origin_coordinator_id: String,
    pub origin_coordinator_url: String,
}

/// `task_claim`: a coordinator announcing ownership of an offered subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskClaimPayload {
    pub subtask_id: String,
    pub claimed_by_coordinator: String,
}

/// `result_announce`: informational completion broadcast. When addressed to
/// the offer's origin coordinator it also carries the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultAnnouncePayload {
    pub subtask_id: String,
    pub task_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = Ed25519KeyPair::generate();
        let msg = MeshMessage::signed(
            &kp,
            MeshMessageType::TaskClaim,
            "peer-a",
            1_000,
            json!({"subtaskId": "S1", "claimedByCoordinator": "peer-a"}),
        )
        .unwrap();
        assert!(msg.verify_signature(&kp.public_key()).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let kp = Ed25519KeyPair::generate();
        let mut msg = MeshMessage::signed(
            &kp,
            MeshMessageType::ResultAnnounce,
            "peer-a",
            1_000,
            json!({"subtaskId": "S1"}),
        )
        .unwrap();
        msg.payload = json!({"subtaskId": "S2"});
        assert!(msg.verify_signature(&kp.public_key()).is_err());
    }

    #[test]
    fn ttl_expiry() {
        let kp = Ed25519KeyPair::generate();
        let msg =
            MeshMessage::signed(&kp, MeshMessageType::PeerExchange, "p", 1_000, json!({})).unwrap();
        assert!(!msg.expired(1_000 + MESH_DEFAULT_TTL_MS));
        assert!(msg.expired(1_001 + MESH_DEFAULT_TTL_MS));
    }

    #[test]
    fn introduction_types_bypass_known_peer_check() {
        assert!(MeshMessageType::PeerExchange.allowed_from_unknown_peer());
        assert!(MeshMessageType::CapabilityAnnounce.allowed_from_unknown_peer());
        assert!(!MeshMessageType::TaskOffer.allowed_from_unknown_peer());
    }
}
