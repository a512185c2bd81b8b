//! Gossip hooks and key directory: the glue that lets the mesh crate stay
//! ignorant of the queue, registry, and settlement types.

use cm_01_peer_mesh::ports::outbound::GossipHooks;
use cm_01_peer_mesh::PeerTable;
use cm_02_task_queue::{EnqueueOpts, QueueService, TimeSource};
use cm_04_agent_registry::RegistryService;
use cm_05_settlement::SettlementService;
use shared_types::KeyDirectory;
use parking_lot::Mutex;
use serde_json::Value;
use shared_crypto::Ed25519PublicKey;
use shared_types::{
    BlacklistRecord, CapabilityAnnouncePayload, MeshMessageType, QuorumRecord,
    ResultAnnouncePayload, TaskClaimPayload, TaskOfferPayload,
};
use std::sync::Arc;
use tracing::debug;

/// Records produced inside synchronous gossip handlers that still need to be
/// broadcast (e.g. a commit triggered by a remote vote). The issuance loop
/// drains and sends them.
#[derive(Default)]
pub struct GossipOutbox {
    pending: Mutex<Vec<(MeshMessageType, Value)>>,
}

impl GossipOutbox {
    /// Empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload for the next broadcast drain.
    pub fn push(&self, message_type: MeshMessageType, payload: Value) {
        self.pending.lock().push((message_type, payload));
    }

    /// Take everything queued.
    pub fn drain(&self) -> Vec<(MeshMessageType, Value)> {
        std::mem::take(&mut self.pending.lock())
    }
}

/// [`GossipHooks`] over the real subsystems.
pub struct CoordinatorHooks {
    pub queue: Arc<QueueService>,
    pub registry: Arc<RegistryService>,
    pub settlement: Arc<SettlementService>,
    pub peers: Arc<PeerTable>,
    /// Registered-key lookups for blacklist and quorum record ingest.
    pub keys: Arc<dyn KeyDirectory>,
    pub time: Arc<dyn TimeSource>,
    pub outbox: Arc<GossipOutbox>,
}

impl GossipHooks for CoordinatorHooks {
    fn on_task_offer(&self, offer: &TaskOfferPayload) -> bool {
        let now_ms = self.time.now_ms();
        // Only take offers we can actually execute.
        if self.registry.directory().live_count(now_ms) == 0 {
            return false;
        }
        self.queue
            .enqueue_subtask(offer.subtask.clone(), EnqueueOpts::default())
    }

    fn on_task_claim(&self, claim: &TaskClaimPayload) {
        if self.queue.mark_remote_claimed(&claim.subtask_id) {
            debug!(
                subtask_id = %claim.subtask_id,
                by = %claim.claimed_by_coordinator,
                "subtask remote-claimed"
            );
        }
    }

    fn on_result_announce(&self, result: &ResultAnnouncePayload) {
        // Informational: drop the subtask if it is still sitting in our
        // queue under someone else's claim race.
        self.queue.mark_remote_claimed(&result.subtask_id);
    }

    fn on_blacklist_update(&self, record: &BlacklistRecord) -> Result<(), String> {
        let now_ms = self.time.now_ms();
        self.registry
            .blacklist()
            .ingest_remote(record, self.keys.as_ref(), now_ms)
            .map_err(|e| e.to_string())
    }

    fn on_quorum_record(&self, _message_type: MeshMessageType, record: &QuorumRecord) {
        let approved = self.peers.coordinator_count() + 1;
        let now_ms = self.time.now_ms();
        if let Some(commit) =
            self.settlement
                .ingest_quorum(record, self.keys.as_ref(), approved, now_ms)
        {
            if let Ok(value) = serde_json::to_value(&commit) {
                self.outbox.push(MeshMessageType::IssuanceCommit, value);
            }
        }
    }

    fn on_capability_announce(&self, peer_id: &str, announce: &CapabilityAnnouncePayload) {
        debug!(
            peer_id,
            models = announce.models.len(),
            max_concurrent = announce.max_concurrent_tasks,
            "capability announce"
        );
    }
}

/// [`KeyDirectory`] over the peer table plus our own identity.
pub struct PeerKeyDirectory {
    pub own_id: String,
    pub own_key: Ed25519PublicKey,
    pub peers: Arc<PeerTable>,
}

impl KeyDirectory for PeerKeyDirectory {
    fn public_key(&self, coordinator_id: &str) -> Option<Ed25519PublicKey> {
        if coordinator_id == self.own_id {
            return Some(self.own_key);
        }
        self.peers.get(coordinator_id).and_then(|p| p.public_key())
    }
}
