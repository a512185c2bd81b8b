//! # Settlement Service
//!
//! Issuance ticks, quorum ingestion, anchor leadership, and payment
//! confirmation behind one facade. The runtime's background loops drive the
//! ticks; the gateway serves the read models.

use crate::domain::{
    elect_leader, AnchorRecord, AnchorStore, IssuanceConfig, IssuanceEngine, IssuanceEpoch,
    PaymentLedger, PriceBook, QuorumLedger, SettlementError,
};
use crate::ports::outbound::AnchorBroadcast;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_crypto::{canonical_json, sha256_hex, Ed25519KeyPair};
use shared_types::{KeyDirectory, QuorumRecord, QuorumRecordType};
use std::sync::Arc;
use tracing::{info, warn};

/// Issuance quorum threshold over approved coordinators.
fn approval_threshold(approved_coordinators: usize) -> usize {
    approved_coordinators / 2 + 1
}

struct EpochState {
    epoch: IssuanceEpoch,
    finalized: bool,
}

/// The settlement facade.
pub struct SettlementService {
    coordinator_id: String,
    config: IssuanceConfig,
    network: String,
    quorum: QuorumLedger,
    engine: Mutex<IssuanceEngine>,
    epochs: DashMap<String, EpochState>,
    anchors: AnchorStore,
    payments: PaymentLedger,
    prices: PriceBook,
    anchor_port: Arc<dyn AnchorBroadcast>,
}

impl SettlementService {
    /// Build the service.
    pub fn new(
        coordinator_id: &str,
        keypair: Arc<Ed25519KeyPair>,
        config: IssuanceConfig,
        network: &str,
        coordinator_fee_bps: u32,
        anchor_port: Arc<dyn AnchorBroadcast>,
        now_ms: u64,
    ) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            config,
            network: network.to_string(),
            quorum: QuorumLedger::new(coordinator_id, keypair),
            engine: Mutex::new(IssuanceEngine::new()),
            epochs: DashMap::new(),
            anchors: AnchorStore::new(),
            payments: PaymentLedger::new(),
            prices: PriceBook::new(coordinator_fee_bps, now_ms),
            anchor_port,
        }
    }

    /// The quorum ledger (snapshot access for routes).
    pub fn quorum(&self) -> &QuorumLedger {
        &self.quorum
    }

    /// Payment intents.
    pub fn payments(&self) -> &PaymentLedger {
        &self.payments
    }

    /// Pricing state.
    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// Anchor records.
    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    /// Issuance configuration.
    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    /// A finalized epoch by id.
    pub fn epoch(&self, epoch_id: &str) -> Option<(IssuanceEpoch, bool)> {
        self.epochs
            .get(epoch_id)
            .map(|s| (s.epoch.clone(), s.finalized))
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// One issuance tick: compute the epoch, append proposal and self-vote,
    /// and finalize immediately when this coordinator alone meets quorum.
    ///
    /// Returns the records to gossip (`issuance_proposal`, `issuance_vote`,
    /// and possibly `issuance_commit`).
    pub fn issuance_tick(
        &self,
        contributions: &[(String, u64)],
        raw_load: f64,
        approved_coordinators: usize,
        now_ms: u64,
    ) -> Result<Vec<QuorumRecord>, SettlementError> {
        if approved_coordinators == 0 {
            return Err(SettlementError::InvalidQuorumThreshold);
        }

        let epoch = self
            .engine
            .lock()
            .compute_epoch(&self.config, contributions, raw_load, now_ms);
        let epoch_id = epoch.epoch_id.clone();
        if self.epochs.contains_key(&epoch_id) {
            // Same recalc bucket; nothing new to propose.
            return Ok(Vec::new());
        }

        let payload = serde_json::to_string(&epoch)
            .map_err(|e| SettlementError::RecordBuild(e.to_string()))?;
        let mut out = Vec::new();
        out.push(
            self.quorum
                .append(QuorumRecordType::IssuanceProposal, &epoch_id, payload, now_ms)?,
        );
        out.push(self.quorum.append(
            QuorumRecordType::IssuanceVote,
            &epoch_id,
            r#"{"approve":true}"#.to_string(),
            now_ms,
        )?);
        self.epochs.insert(
            epoch_id.clone(),
            EpochState {
                epoch,
                finalized: false,
            },
        );

        if let Some(commit) = self.maybe_finalize(&epoch_id, approved_coordinators, now_ms)? {
            out.push(commit);
        }
        Ok(out)
    }

    /// Ingest a gossiped quorum record; votes may tip an epoch we proposed
    /// over its threshold, in which case the commit record is returned for
    /// broadcast.
    ///
    /// The record's signature is verified against the registered key of its
    /// claimed coordinator before it can count toward any tally.
    pub fn ingest_quorum(
        &self,
        record: &QuorumRecord,
        keys: &dyn KeyDirectory,
        approved_coordinators: usize,
        now_ms: u64,
    ) -> Option<QuorumRecord> {
        if let Err(error) = self.quorum.ingest_remote(record, keys) {
            warn!(
                %error,
                coordinator_id = %record.coordinator_id,
                epoch_id = %record.epoch_id,
                "quorum record rejected"
            );
            return None;
        }
        if record.record_type != QuorumRecordType::IssuanceVote {
            return None;
        }
        match self.maybe_finalize(&record.epoch_id, approved_coordinators.max(1), now_ms) {
            Ok(commit) => commit,
            Err(error) => {
                warn!(%error, epoch_id = %record.epoch_id, "finalization check failed");
                None
            }
        }
    }

    fn maybe_finalize(
        &self,
        epoch_id: &str,
        approved_coordinators: usize,
        now_ms: u64,
    ) -> Result<Option<QuorumRecord>, SettlementError> {
        let Some(mut state) = self.epochs.get_mut(epoch_id) else {
            return Ok(None);
        };
        if state.finalized
            || self.quorum.vote_count(epoch_id) < approval_threshold(approved_coordinators)
            || self.quorum.has_commit(epoch_id)
        {
            return Ok(None);
        }

        let commit = self.quorum.append(
            QuorumRecordType::IssuanceCommit,
            epoch_id,
            r#"{"finalized":true}"#.to_string(),
            now_ms,
        )?;
        state.finalized = true;
        info!(epoch_id, pool = state.epoch.pool, "issuance epoch finalized");
        Ok(Some(commit))
    }

    // =========================================================================
    // ANCHORING
    // =========================================================================

    /// Deterministic leadership over the reachable peer set (self included).
    pub fn is_anchor_leader(&self, reachable_peer_ids: &[String]) -> bool {
        let mut ids: Vec<&str> = reachable_peer_ids.iter().map(|s| s.as_str()).collect();
        ids.push(self.coordinator_id.as_str());
        elect_leader(ids) == Some(self.coordinator_id.as_str())
    }

    /// Anchor every finalized epoch that has no anchor yet. Leader only.
    ///
    /// Returns the quorum checkpoint records to gossip.
    pub async fn anchor_finalized_epochs(
        &self,
        now_ms: u64,
    ) -> Result<Vec<QuorumRecord>, SettlementError> {
        let finalized: Vec<IssuanceEpoch> = self
            .epochs
            .iter()
            .filter(|s| s.finalized)
            .map(|s| s.epoch.clone())
            .collect();

        let mut out = Vec::new();
        for epoch in finalized {
            let checkpoint_hash = epoch_checkpoint_hash(&epoch)?;
            if self.anchors.has_anchor_for(&checkpoint_hash) {
                continue;
            }
            out.push(self.quorum.append(
                QuorumRecordType::IssuanceCheckpoint,
                &epoch.epoch_id,
                format!(r#"{{"checkpointHash":"{checkpoint_hash}"}}"#),
                now_ms,
            )?);
            self.anchor_checkpoint(&epoch.epoch_id, &checkpoint_hash).await;
        }
        Ok(out)
    }

    /// Record an anchor intent for a checkpoint hash (stats or epoch).
    pub async fn anchor_checkpoint(&self, epoch_id: &str, checkpoint_hash: &str) -> Option<AnchorRecord> {
        if self.anchors.has_anchor_for(checkpoint_hash) {
            return self.anchors.find_by_checkpoint(checkpoint_hash);
        }
        match self.anchor_port.submit(checkpoint_hash).await {
            Ok(tx_ref) => Some(self.anchors.record_intent(
                epoch_id,
                checkpoint_hash,
                &self.network,
                &tx_ref,
            )),
            Err(error) => {
                warn!(error, checkpoint_hash, "anchor submission failed");
                None
            }
        }
    }

    /// Confirm pending anchors and demote anchored ones that fell off the
    /// longest chain. Runs every stats-anchor tick, leader or not.
    pub async fn reconcile_anchors(&self) {
        for anchor in self.anchors.all() {
            match self
                .anchor_port
                .verify(&anchor.checkpoint_hash, &anchor.tx_ref)
                .await
            {
                Ok(true) => {
                    self.anchors.confirm(&anchor.anchor_id);
                }
                Ok(false) => {
                    if matches!(anchor.status, crate::domain::AnchorStatus::Anchored) {
                        warn!(anchor_id = %anchor.anchor_id, "anchor lost to reorg, demoting");
                        self.anchors.demote(&anchor.anchor_id);
                    }
                }
                Err(error) => {
                    warn!(error, anchor_id = %anchor.anchor_id, "anchor verification failed");
                }
            }
        }
    }
}

/// Checkpoint hash of a finalized epoch: SHA-256 of the canonical epoch +
/// allocations document.
pub fn epoch_checkpoint_hash(epoch: &IssuanceEpoch) -> Result<String, SettlementError> {
    let canonical =
        canonical_json(epoch).map_err(|e| SettlementError::RecordBuild(e.to_string()))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_crypto::Ed25519PublicKey;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticKeys(Vec<(String, Ed25519PublicKey)>);

    impl KeyDirectory for StaticKeys {
        fn public_key(&self, coordinator_id: &str) -> Option<Ed25519PublicKey> {
            self.0
                .iter()
                .find(|(id, _)| id == coordinator_id)
                .map(|(_, key)| *key)
        }
    }

    struct ScriptedAnchor {
        visible: AtomicBool,
    }

    #[async_trait]
    impl AnchorBroadcast for ScriptedAnchor {
        async fn submit(&self, checkpoint_hash: &str) -> Result<String, String> {
            Ok(format!("tx-{}", &checkpoint_hash[..8]))
        }
        async fn verify(&self, _checkpoint_hash: &str, _tx_ref: &str) -> Result<bool, String> {
            Ok(self.visible.load(Ordering::SeqCst))
        }
    }

    fn service(anchor: Arc<ScriptedAnchor>) -> SettlementService {
        SettlementService::new(
            "coord-a",
            Arc::new(Ed25519KeyPair::generate()),
            IssuanceConfig::default(),
            "testnet",
            250,
            anchor,
            0,
        )
    }

    #[test]
    fn solo_tick_proposes_votes_and_commits() {
        let svc = service(Arc::new(ScriptedAnchor {
            visible: AtomicBool::new(true),
        }));
        let records = svc
            .issuance_tick(&[("acct-1".into(), 10)], 1.0, 1, 600_000)
            .unwrap();
        let types: Vec<QuorumRecordType> = records.iter().map(|r| r.record_type).collect();
        assert_eq!(
            types,
            vec![
                QuorumRecordType::IssuanceProposal,
                QuorumRecordType::IssuanceVote,
                QuorumRecordType::IssuanceCommit,
            ]
        );
        // Same bucket again: nothing new.
        assert!(svc
            .issuance_tick(&[("acct-1".into(), 10)], 1.0, 1, 600_001)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn two_coordinators_need_remote_vote() {
        let svc = service(Arc::new(ScriptedAnchor {
            visible: AtomicBool::new(true),
        }));
        let records = svc
            .issuance_tick(&[("acct-1".into(), 10)], 1.0, 2, 600_000)
            .unwrap();
        assert_eq!(records.len(), 2);
        let epoch_id = records[0].epoch_id.clone();

        // Remote vote arrives from a coordinator whose key is registered.
        let peer_kp = Arc::new(Ed25519KeyPair::generate());
        let keys = StaticKeys(vec![("coord-b".to_string(), peer_kp.public_key())]);
        let peer = QuorumLedger::new("coord-b", peer_kp);
        let vote = peer
            .append(QuorumRecordType::IssuanceVote, &epoch_id, "{}".into(), 601_000)
            .unwrap();
        let commit = svc.ingest_quorum(&vote, &keys, 2, 601_000);
        assert!(commit.is_some());
        assert!(svc.epoch(&epoch_id).unwrap().1);
    }

    #[test]
    fn unverifiable_vote_never_tips_quorum() {
        let svc = service(Arc::new(ScriptedAnchor {
            visible: AtomicBool::new(true),
        }));
        let records = svc
            .issuance_tick(&[("acct-1".into(), 10)], 1.0, 2, 600_000)
            .unwrap();
        let epoch_id = records[0].epoch_id.clone();

        // A vote under a coordinator id the directory cannot resolve.
        let peer = QuorumLedger::new("coord-ghost", Arc::new(Ed25519KeyPair::generate()));
        let vote = peer
            .append(QuorumRecordType::IssuanceVote, &epoch_id, "{}".into(), 601_000)
            .unwrap();
        let keys = StaticKeys(Vec::new());
        assert!(svc.ingest_quorum(&vote, &keys, 2, 601_000).is_none());
        assert!(!svc.epoch(&epoch_id).unwrap().1);
        assert_eq!(svc.quorum().vote_count(&epoch_id), 1);
    }

    #[tokio::test]
    async fn leader_anchors_finalized_epoch_and_reorg_demotes() {
        let anchor = Arc::new(ScriptedAnchor {
            visible: AtomicBool::new(true),
        });
        let svc = service(anchor.clone());
        svc.issuance_tick(&[("acct-1".into(), 10)], 1.0, 1, 600_000)
            .unwrap();

        assert!(svc.is_anchor_leader(&["coord-z".into()]));
        let checkpoints = svc.anchor_finalized_epochs(700_000).await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(svc.anchors().all().len(), 1);

        svc.reconcile_anchors().await;
        assert_eq!(svc.anchors().anchored().len(), 1);

        // The transaction vanishes from the longest chain.
        anchor.visible.store(false, Ordering::SeqCst);
        svc.reconcile_anchors().await;
        assert!(svc.anchors().anchored().is_empty());
    }

    #[test]
    fn leadership_is_lexicographic() {
        let svc = service(Arc::new(ScriptedAnchor {
            visible: AtomicBool::new(true),
        }));
        assert!(svc.is_anchor_leader(&["coord-b".into(), "coord-z".into()]));
        assert!(!svc.is_anchor_leader(&["coord-0".into()]));
    }
}
