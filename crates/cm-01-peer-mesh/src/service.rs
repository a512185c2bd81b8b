//! # Mesh Service
//!
//! Inbound envelope validation + dispatch, and outbound broadcast over the
//! socket registry with an HTTP fallback for peers without a live socket.

use crate::domain::{MeshConfig, MeshError, PeerTable, RateWindows};
use crate::ports::outbound::{GossipHooks, PeerTransport};
use crate::sockets::SocketRegistry;
use dashmap::DashMap;
use serde_json::Value;
use shared_crypto::Ed25519KeyPair;
use shared_types::{
    BlacklistRecord, CapabilityAnnouncePayload, CapabilitySummaryPayload, MeshMessage,
    MeshMessageType, NetworkMode, PeerExchangePayload, PeerIdentity, PeerRole, QuorumRecord,
    ResultAnnouncePayload, TaskClaimPayload, TaskOfferPayload,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where an offered subtask came from, so its result can be forwarded home.
#[derive(Debug, Clone)]
pub struct OfferOrigin {
    pub coordinator_id: String,
    pub coordinator_url: String,
}

/// What a processed envelope did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Dispatched to a handler.
    Handled,
    /// Valid but deliberately skipped (own echo, no live agents, ...).
    Ignored(&'static str),
}

/// The gossip layer.
pub struct MeshService {
    identity: PeerIdentity,
    keypair: Arc<Ed25519KeyPair>,
    config: MeshConfig,
    table: Arc<PeerTable>,
    sockets: Arc<SocketRegistry>,
    rate: RateWindows,
    transport: Arc<dyn PeerTransport>,
    hooks: Arc<dyn GossipHooks>,
    /// `subtask_id -> origin` for results that must travel back.
    origins: DashMap<String, OfferOrigin>,
    /// Latest capability summary per coordinator.
    summaries: DashMap<String, CapabilitySummaryPayload>,
}

impl MeshService {
    /// Build the service.
    pub fn new(
        identity: PeerIdentity,
        keypair: Arc<Ed25519KeyPair>,
        config: MeshConfig,
        table: Arc<PeerTable>,
        sockets: Arc<SocketRegistry>,
        transport: Arc<dyn PeerTransport>,
        hooks: Arc<dyn GossipHooks>,
    ) -> Self {
        Self {
            identity,
            keypair,
            config,
            table,
            sockets,
            rate: RateWindows::new(),
            transport,
            hooks,
            origins: DashMap::new(),
            summaries: DashMap::new(),
        }
    }

    /// This coordinator's mesh identity.
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// The peer table.
    pub fn table(&self) -> &Arc<PeerTable> {
        &self.table
    }

    /// The socket registry.
    pub fn sockets(&self) -> &Arc<SocketRegistry> {
        &self.sockets
    }

    /// Origin of a remotely offered subtask, if any.
    pub fn origin_for(&self, subtask_id: &str) -> Option<OfferOrigin> {
        self.origins.get(subtask_id).map(|o| o.clone())
    }

    /// Forget an origin once the result went home.
    pub fn clear_origin(&self, subtask_id: &str) {
        self.origins.remove(subtask_id);
    }

    /// Latest capability summaries, keyed by coordinator.
    pub fn capability_summaries(&self) -> Vec<CapabilitySummaryPayload> {
        self.summaries.iter().map(|s| s.clone()).collect()
    }

    /// Prune idle rate windows (runtime loop).
    pub fn prune_rate_windows(&self, now_ms: u64) {
        self.rate.prune(now_ms);
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Validate and dispatch one envelope.
    pub async fn handle_message(
        &self,
        message: MeshMessage,
        now_ms: u64,
    ) -> Result<IngestOutcome, MeshError> {
        if message.expired(now_ms) {
            return Err(MeshError::Expired);
        }
        if message.from_peer_id == self.identity.peer_id {
            return Ok(IngestOutcome::Ignored("own echo"));
        }

        let sender = self.table.get(&message.from_peer_id);
        match &sender {
            Some(peer) => {
                let key = peer
                    .public_key()
                    .ok_or_else(|| MeshError::PeerUnknown(message.from_peer_id.clone()))?;
                if message.verify_signature(&key).is_err() {
                    self.table.score_bad_signature(&message.from_peer_id);
                    return Err(MeshError::SignatureInvalid);
                }
            }
            None if message.message_type.allowed_from_unknown_peer() => {
                // Introduction path: no key on file yet, signature checked
                // once the peer lands in the table.
            }
            None => return Err(MeshError::PeerUnknown(message.from_peer_id.clone())),
        }

        if !self
            .rate
            .check(&message.from_peer_id, self.config.rate_limit_per_10s, now_ms)
        {
            self.table.score_rate_overflow(&message.from_peer_id);
            return Err(MeshError::PeerRateLimited);
        }

        if sender.is_some() {
            self.table.score_good(&message.from_peer_id);
            self.table.touch(&message.from_peer_id, now_ms);
        }

        self.dispatch(message, now_ms).await
    }

    async fn dispatch(
        &self,
        message: MeshMessage,
        now_ms: u64,
    ) -> Result<IngestOutcome, MeshError> {
        match message.message_type {
            MeshMessageType::PeerExchange => {
                let payload: PeerExchangePayload = parse(&message.payload)?;
                let mut merged = 0;
                for advert in payload.peers {
                    if advert.peer_id == self.identity.peer_id {
                        continue;
                    }
                    if self.table.get(&advert.peer_id).is_none() {
                        let identity = PeerIdentity {
                            peer_id: advert.peer_id.clone(),
                            public_key_pem: advert.public_key.clone(),
                            coordinator_url: advert.url.clone(),
                            network_mode: advert.network_mode,
                            role: advert.role,
                        };
                        if self.table.add_peer(identity, &advert.url, now_ms) {
                            merged += 1;
                        }
                    }
                }
                debug!(from = %message.from_peer_id, merged, "peer exchange merged");
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::CapabilityAnnounce => {
                let payload: CapabilityAnnouncePayload = parse(&message.payload)?;
                self.hooks
                    .on_capability_announce(&message.from_peer_id, &payload);
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::CapabilitySummary => {
                let payload: CapabilitySummaryPayload = parse(&message.payload)?;
                self.summaries
                    .insert(message.from_peer_id.clone(), payload);
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::TaskOffer => {
                let payload: TaskOfferPayload = parse_offer(&message.payload)?;
                if payload.origin_coordinator_id == self.identity.peer_id {
                    return Ok(IngestOutcome::Ignored("own offer"));
                }
                if !self.hooks.on_task_offer(&payload) {
                    return Ok(IngestOutcome::Ignored("offer not taken"));
                }
                self.origins.insert(
                    payload.subtask.id.clone(),
                    OfferOrigin {
                        coordinator_id: payload.origin_coordinator_id.clone(),
                        coordinator_url: payload.origin_coordinator_url.clone(),
                    },
                );
                // Announce ownership so the origin (and everyone else)
                // drops the subtask from their queues.
                let claim = TaskClaimPayload {
                    subtask_id: payload.subtask.id.clone(),
                    claimed_by_coordinator: self.identity.peer_id.clone(),
                };
                if let Ok(value) = serde_json::to_value(&claim) {
                    self.broadcast(MeshMessageType::TaskClaim, value, now_ms).await;
                }
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::TaskClaim => {
                let payload: TaskClaimPayload = parse(&message.payload)?;
                self.hooks.on_task_claim(&payload);
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::ResultAnnounce => {
                let payload: ResultAnnouncePayload = parse(&message.payload)?;
                self.hooks.on_result_announce(&payload);
                Ok(IngestOutcome::Handled)
            }

            MeshMessageType::BlacklistUpdate => {
                let record: BlacklistRecord = parse(&message.payload)?;
                match self.hooks.on_blacklist_update(&record) {
                    Ok(()) => Ok(IngestOutcome::Handled),
                    Err(reason) => {
                        warn!(from = %message.from_peer_id, reason, "blacklist update rejected");
                        Ok(IngestOutcome::Ignored("blacklist rejected"))
                    }
                }
            }

            MeshMessageType::IssuanceProposal
            | MeshMessageType::IssuanceVote
            | MeshMessageType::IssuanceCommit
            | MeshMessageType::IssuanceCheckpoint => {
                let record: QuorumRecord = parse(&message.payload)?;
                self.hooks.on_quorum_record(message.message_type, &record);
                Ok(IngestOutcome::Handled)
            }
        }
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Sign and broadcast a payload to every peer: WebSocket push when a
    /// socket is live, HTTP POST otherwise. Fire-and-forget.
    pub async fn broadcast(&self, message_type: MeshMessageType, payload: Value, now_ms: u64) {
        let message = match MeshMessage::signed(
            &self.keypair,
            message_type,
            &self.identity.peer_id,
            now_ms,
            payload,
        ) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "broadcast envelope signing failed");
                return;
            }
        };
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "broadcast serialization failed");
                return;
            }
        };

        for peer in self.table.all() {
            if self.sockets.send(&peer.identity.peer_id, &frame) {
                continue;
            }
            if peer.identity.role != PeerRole::Coordinator
                || peer.identity.network_mode != NetworkMode::Public
            {
                continue;
            }
            let transport = Arc::clone(&self.transport);
            let url = peer.reachable_url.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(error) = transport.post_ingest(&url, &message).await {
                    debug!(url, error, "mesh POST failed");
                }
            });
        }
    }

    /// Announce a completed result: broadcast to the mesh, and when the
    /// subtask arrived as a remote offer, send the full result straight to
    /// its origin coordinator and forget the origin.
    pub async fn announce_result(&self, payload: ResultAnnouncePayload, now_ms: u64) {
        let origin = self.origin_for(&payload.subtask_id);

        if let Some(origin) = origin {
            let message = MeshMessage::signed(
                &self.keypair,
                MeshMessageType::ResultAnnounce,
                &self.identity.peer_id,
                now_ms,
                match serde_json::to_value(&payload) {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(%error, "result payload serialization failed");
                        return;
                    }
                },
            );
            if let Ok(message) = message {
                if let Err(error) = self
                    .transport
                    .post_ingest(&origin.coordinator_url, &message)
                    .await
                {
                    warn!(
                        url = %origin.coordinator_url,
                        error,
                        "result forward to origin failed"
                    );
                }
            }
            self.clear_origin(&payload.subtask_id);
        }

        // The broadcast copy is informational and carries no output.
        let slim = ResultAnnouncePayload {
            output: None,
            duration_ms: None,
            ..payload
        };
        if let Ok(value) = serde_json::to_value(&slim) {
            self.broadcast(MeshMessageType::ResultAnnounce, value, now_ms)
                .await;
        }
    }

    /// Build the `peer_exchange` payload: up to the configured cap, self
    /// included so new peers learn our key.
    pub fn exchange_payload(&self, now_ms: u64) -> PeerExchangePayload {
        let mut peers: Vec<_> = self.table.all();
        peers.sort_by(|a, b| b.last_seen_ms.cmp(&a.last_seen_ms));
        peers.truncate(self.config.max_peers_in_exchange.saturating_sub(1));

        let mut adverts: Vec<_> = peers.iter().map(|p| p.advert()).collect();
        adverts.push(shared_types::PeerAdvert {
            peer_id: self.identity.peer_id.clone(),
            public_key: self.identity.public_key_pem.clone(),
            url: self.identity.coordinator_url.clone(),
            network_mode: self.identity.network_mode,
            role: self.identity.role,
            last_seen_ms: now_ms,
        });
        PeerExchangePayload { peers: adverts }
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, MeshError> {
    serde_json::from_value(payload.clone()).map_err(|e| MeshError::InvalidPayload(e.to_string()))
}

fn parse_offer(payload: &Value) -> Result<TaskOfferPayload, MeshError> {
    let offer: TaskOfferPayload = serde_json::from_value(payload.clone())
        .map_err(|e| MeshError::InvalidTaskOffer(e.to_string()))?;
    if offer.subtask.id.is_empty() || offer.origin_coordinator_id.is_empty() {
        return Err(MeshError::InvalidTaskOffer(
            "subtask id and origin are required".into(),
        ));
    }
    Ok(offer)
}
