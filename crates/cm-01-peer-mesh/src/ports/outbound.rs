//! Outbound (driven) ports for the peer mesh.
//!
//! The mesh never references the queue, registry, or ledger types directly;
//! the runtime implements [`GossipHooks`] over them, which keeps ownership
//! acyclic.

use async_trait::async_trait;
use shared_types::{
    BlacklistRecord, CapabilityAnnouncePayload, MeshMessage, MeshMessageType, PeerIdentity,
    QuorumRecord, ResultAnnouncePayload, TaskClaimPayload, TaskOfferPayload,
};

/// HTTP transport to peer coordinators.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// `GET /identity` with the bootstrap timeout.
    async fn fetch_identity(&self, base_url: &str) -> Result<PeerIdentity, String>;

    /// `POST /mesh/register-peer` with our identity.
    async fn register_peer(&self, base_url: &str, own: &PeerIdentity) -> Result<(), String>;

    /// `POST /mesh/ingest` with a signed envelope. Fire-and-forget callers
    /// ignore the result.
    async fn post_ingest(&self, base_url: &str, message: &MeshMessage) -> Result<(), String>;
}

/// Effects gossip has on the rest of the coordinator.
pub trait GossipHooks: Send + Sync {
    /// A peer offered a subtask. Return `true` when it was enqueued locally
    /// (we have live agents and the id was new), which triggers a
    /// `task_claim` broadcast.
    fn on_task_offer(&self, offer: &TaskOfferPayload) -> bool;

    /// A peer claimed a subtask we also hold: deduplicate.
    fn on_task_claim(&self, claim: &TaskClaimPayload);

    /// A peer announced a completed result.
    fn on_result_announce(&self, result: &ResultAnnouncePayload);

    /// A gossiped blacklist event. Implementations validate chain linkage.
    fn on_blacklist_update(&self, record: &BlacklistRecord) -> Result<(), String>;

    /// An issuance-flow quorum record.
    fn on_quorum_record(&self, message_type: MeshMessageType, record: &QuorumRecord);

    /// An agent/phone peer advertised its capabilities.
    fn on_capability_announce(&self, peer_id: &str, announce: &CapabilityAnnouncePayload);
}
