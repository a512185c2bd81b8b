//! # Blacklist Chain
//!
//! Signed, hash-chained declarations that an agent is forbidden. The chain
//! is independent of the ordering chain; gossiped updates must extend the
//! local head, carry a coordinator signature that verifies against the key
//! registered for their claimed source, or they are rejected without
//! mutating state.
//!
//! Machine-raised reason codes carry a reporter signature over the canonical
//! JSON of `{agentId, evidenceHashSha256, reasonCode}`; operator action is
//! vouched for by the coordinator's own signature alone. The reporter check
//! runs on both the local append and the gossip ingest path.

use super::errors::RegistryError;
use parking_lot::Mutex;
use serde::Serialize;
use shared_crypto::{canonical_json, sha256_hex, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{BlacklistReasonCode, BlacklistRecord, KeyDirectory, GENESIS_HASH};
use std::sync::Arc;
use tracing::info;

/// Input for a locally raised blacklist event.
#[derive(Debug, Clone)]
pub struct NewBlacklistEvent {
    pub agent_id: String,
    pub reason_code: BlacklistReasonCode,
    pub reason: String,
    pub evidence_hash_sha256: String,
    pub reporter_id: String,
    pub reporter_signature: Option<String>,
    pub reporter_public_key_pem: Option<String>,
    pub expires_at_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReporterClaim<'a> {
    agent_id: &'a str,
    evidence_hash_sha256: &'a str,
    reason_code: BlacklistReasonCode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashableEvent<'a> {
    event_id: &'a str,
    agent_id: &'a str,
    reason_code: BlacklistReasonCode,
    reason: &'a str,
    evidence_hash_sha256: &'a str,
    reporter_id: &'a str,
    reporter_signature: Option<&'a str>,
    reporter_public_key_pem: Option<&'a str>,
    source_coordinator_id: &'a str,
    timestamp_ms: u64,
    expires_at_ms: Option<u64>,
    prev_event_hash: &'a str,
}

fn hashable<'a>(record: &'a BlacklistRecord) -> HashableEvent<'a> {
    HashableEvent {
        event_id: &record.event_id,
        agent_id: &record.agent_id,
        reason_code: record.reason_code,
        reason: &record.reason,
        evidence_hash_sha256: &record.evidence_hash_sha256,
        reporter_id: &record.reporter_id,
        reporter_signature: record.reporter_signature.as_deref(),
        reporter_public_key_pem: record.reporter_public_key_pem.as_deref(),
        source_coordinator_id: &record.source_coordinator_id,
        timestamp_ms: record.timestamp_ms,
        expires_at_ms: record.expires_at_ms,
        prev_event_hash: &record.prev_event_hash,
    }
}

/// The per-coordinator blacklist hash chain.
pub struct BlacklistChain {
    coordinator_id: String,
    keypair: Arc<Ed25519KeyPair>,
    events: Mutex<Vec<BlacklistRecord>>,
}

impl BlacklistChain {
    /// Empty chain owned by `coordinator_id`.
    pub fn new(coordinator_id: &str, keypair: Arc<Ed25519KeyPair>) -> Self {
        Self {
            coordinator_id: coordinator_id.to_string(),
            keypair,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Chain version: number of events. Delivered to agents on heartbeat so
    /// they can fetch deltas.
    pub fn version(&self) -> u64 {
        self.events.lock().len() as u64
    }

    /// Full audit snapshot.
    pub fn audit(&self) -> Vec<BlacklistRecord> {
        self.events.lock().clone()
    }

    /// Head hash, or `GENESIS` for an empty chain.
    pub fn head_hash(&self) -> String {
        self.events
            .lock()
            .last()
            .map(|e| e.event_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Currently blacklisted agent ids (unexpired events).
    pub fn active_agents(&self, now_ms: u64) -> Vec<String> {
        let mut agents: Vec<String> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.expires_at_ms.map_or(true, |exp| exp > now_ms))
            .map(|e| e.agent_id.clone())
            .collect();
        agents.sort();
        agents.dedup();
        agents
    }

    /// True when an unexpired event names the agent.
    pub fn is_blacklisted(&self, agent_id: &str, now_ms: u64) -> bool {
        self.events.lock().iter().any(|e| {
            e.agent_id == agent_id && e.expires_at_ms.map_or(true, |exp| exp > now_ms)
        })
    }

    /// Raise a local event: validates the payload, checks the reporter
    /// signature for machine reason codes, links, hashes, signs, appends.
    pub fn append_local(
        &self,
        input: NewBlacklistEvent,
        now_ms: u64,
    ) -> Result<BlacklistRecord, RegistryError> {
        if input.evidence_hash_sha256.len() != 64
            || !input
                .evidence_hash_sha256
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        {
            return Err(RegistryError::InvalidBlacklistPayload(
                "evidenceHashSha256 must be 64 hex characters".into(),
            ));
        }
        if input.agent_id.is_empty() {
            return Err(RegistryError::InvalidBlacklistPayload(
                "agentId must be non-empty".into(),
            ));
        }

        if input.reason_code.requires_reporter_signature() {
            verify_reporter_claim(
                &input.agent_id,
                &input.evidence_hash_sha256,
                input.reason_code,
                input.reporter_signature.as_deref(),
                input.reporter_public_key_pem.as_deref(),
            )?;
        }

        let mut events = self.events.lock();
        let prev_event_hash = events
            .last()
            .map(|e| e.event_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let event_id = uuid::Uuid::new_v4().to_string();
        let mut record = BlacklistRecord {
            event_id,
            agent_id: input.agent_id,
            reason_code: input.reason_code,
            reason: input.reason,
            evidence_hash_sha256: input.evidence_hash_sha256,
            reporter_id: input.reporter_id,
            reporter_signature: input.reporter_signature,
            reporter_public_key_pem: input.reporter_public_key_pem,
            source_coordinator_id: self.coordinator_id.clone(),
            timestamp_ms: now_ms,
            expires_at_ms: input.expires_at_ms,
            prev_event_hash,
            event_hash: String::new(),
            coordinator_signature: String::new(),
        };
        record.event_hash = sha256_hex(
            canonical_json(&hashable(&record))
                .map_err(|e| RegistryError::InvalidBlacklistPayload(e.to_string()))?
                .as_bytes(),
        );
        record.coordinator_signature = self.keypair.sign(record.event_hash.as_bytes()).to_hex();

        events.push(record.clone());
        info!(agent_id = %record.agent_id, reason_code = ?record.reason_code, "agent blacklisted");
        Ok(record)
    }

    /// Ingest a gossiped event. The event must extend our head, not predate
    /// our newest event, recompute to its own hash, carry a coordinator
    /// signature that verifies against the key registered for its claimed
    /// source, and re-pass the reporter check for machine reason codes; any
    /// failure leaves local state untouched.
    pub fn ingest_remote(
        &self,
        record: &BlacklistRecord,
        keys: &dyn KeyDirectory,
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        let _ = now_ms;
        let mut events = self.events.lock();

        let head_hash = events
            .last()
            .map(|e| e.event_hash.as_str())
            .unwrap_or(GENESIS_HASH);
        if record.prev_event_hash != head_hash {
            return Err(RegistryError::ChainMismatch);
        }
        if let Some(head) = events.last() {
            if record.timestamp_ms < head.timestamp_ms {
                return Err(RegistryError::ChainMismatch);
            }
        }

        let recomputed = sha256_hex(
            canonical_json(&hashable(record))
                .map_err(|e| RegistryError::InvalidBlacklistPayload(e.to_string()))?
                .as_bytes(),
        );
        if recomputed != record.event_hash {
            return Err(RegistryError::InvalidBlacklistPayload(
                "event hash does not recompute".into(),
            ));
        }

        // The hash only binds the record to itself; authenticity comes from
        // the registered key of the claimed source coordinator.
        let source_key = keys
            .public_key(&record.source_coordinator_id)
            .ok_or_else(|| {
                RegistryError::UnknownCoordinator(record.source_coordinator_id.clone())
            })?;
        let signature = Ed25519Signature::from_hex(&record.coordinator_signature)
            .map_err(|_| RegistryError::CoordinatorSignatureInvalid)?;
        source_key
            .verify(record.event_hash.as_bytes(), &signature)
            .map_err(|_| RegistryError::CoordinatorSignatureInvalid)?;

        if record.reason_code.requires_reporter_signature() {
            verify_reporter_claim(
                &record.agent_id,
                &record.evidence_hash_sha256,
                record.reason_code,
                record.reporter_signature.as_deref(),
                record.reporter_public_key_pem.as_deref(),
            )?;
        }

        events.push(record.clone());
        Ok(())
    }
}

/// Verify a reporter's signature over the canonical claim. Both the local
/// append and the gossip ingest run machine reason codes through this.
fn verify_reporter_claim(
    agent_id: &str,
    evidence_hash_sha256: &str,
    reason_code: BlacklistReasonCode,
    signature_hex: Option<&str>,
    reporter_pem: Option<&str>,
) -> Result<(), RegistryError> {
    let (Some(signature_hex), Some(pem)) = (signature_hex, reporter_pem) else {
        return Err(RegistryError::ReporterSignatureInvalid);
    };

    let claim = ReporterClaim {
        agent_id,
        evidence_hash_sha256,
        reason_code,
    };
    let message = canonical_json(&claim).map_err(|_| RegistryError::ReporterSignatureInvalid)?;
    let key = Ed25519PublicKey::from_pem(pem).map_err(|_| RegistryError::ReporterSignatureInvalid)?;
    let signature = Ed25519Signature::from_hex(signature_hex)
        .map_err(|_| RegistryError::ReporterSignatureInvalid)?;
    key.verify(message.as_bytes(), &signature)
        .map_err(|_| RegistryError::ReporterSignatureInvalid)
}

/// Sign a reporter claim the way policy engines do. Exposed for tests and
/// for the local policy engine adapter.
pub fn sign_reporter_claim(
    keypair: &Ed25519KeyPair,
    agent_id: &str,
    evidence_hash_sha256: &str,
    reason_code: BlacklistReasonCode,
) -> Result<String, RegistryError> {
    let claim = ReporterClaim {
        agent_id,
        evidence_hash_sha256,
        reason_code,
    };
    let message =
        canonical_json(&claim).map_err(|_| RegistryError::ReporterSignatureInvalid)?;
    Ok(keypair.sign(message.as_bytes()).to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> BlacklistChain {
        BlacklistChain::new("coord-a", Arc::new(Ed25519KeyPair::generate()))
    }

    fn operator_event(agent_id: &str) -> NewBlacklistEvent {
        NewBlacklistEvent {
            agent_id: agent_id.into(),
            reason_code: BlacklistReasonCode::OperatorAction,
            reason: "manual ban".into(),
            evidence_hash_sha256: "ab".repeat(32),
            reporter_id: "operator".into(),
            reporter_signature: None,
            reporter_public_key_pem: None,
            expires_at_ms: None,
        }
    }

    #[test]
    fn chain_links_and_blacklists() {
        let chain = chain();
        let first = chain.append_local(operator_event("worker-1"), 1_000).unwrap();
        assert_eq!(first.prev_event_hash, GENESIS_HASH);

        let second = chain.append_local(operator_event("worker-2"), 2_000).unwrap();
        assert_eq!(second.prev_event_hash, first.event_hash);

        assert!(chain.is_blacklisted("worker-1", 3_000));
        assert_eq!(chain.version(), 2);
    }

    #[test]
    fn expiry_lifts_the_ban() {
        let chain = chain();
        let mut event = operator_event("worker-1");
        event.expires_at_ms = Some(5_000);
        chain.append_local(event, 1_000).unwrap();

        assert!(chain.is_blacklisted("worker-1", 4_999));
        assert!(!chain.is_blacklisted("worker-1", 5_000));
    }

    #[test]
    fn machine_reason_requires_valid_reporter_signature() {
        let chain = chain();
        let reporter = Ed25519KeyPair::generate();
        let evidence = "cd".repeat(32);

        let mut event = NewBlacklistEvent {
            agent_id: "worker-1".into(),
            reason_code: BlacklistReasonCode::DosBehavior,
            reason: "ping flood".into(),
            evidence_hash_sha256: evidence.clone(),
            reporter_id: "policy-engine".into(),
            reporter_signature: None,
            reporter_public_key_pem: Some(reporter.public_key().to_pem().unwrap()),
            expires_at_ms: None,
        };
        assert_eq!(
            chain.append_local(event.clone(), 1_000).unwrap_err(),
            RegistryError::ReporterSignatureInvalid
        );

        event.reporter_signature = Some(
            sign_reporter_claim(&reporter, "worker-1", &evidence, BlacklistReasonCode::DosBehavior)
                .unwrap(),
        );
        assert!(chain.append_local(event.clone(), 1_000).is_ok());

        // Signature over different evidence does not transfer.
        event.evidence_hash_sha256 = "ef".repeat(32);
        assert_eq!(
            chain.append_local(event, 2_000).unwrap_err(),
            RegistryError::ReporterSignatureInvalid
        );
    }

    struct StaticKeys(Vec<(String, Ed25519PublicKey)>);

    impl KeyDirectory for StaticKeys {
        fn public_key(&self, coordinator_id: &str) -> Option<Ed25519PublicKey> {
            self.0
                .iter()
                .find(|(id, _)| id == coordinator_id)
                .map(|(_, key)| *key)
        }
    }

    fn two_chains() -> (BlacklistChain, BlacklistChain, StaticKeys) {
        let kp_a = Arc::new(Ed25519KeyPair::generate());
        let kp_b = Arc::new(Ed25519KeyPair::generate());
        let keys = StaticKeys(vec![
            ("coord-a".to_string(), kp_a.public_key()),
            ("coord-b".to_string(), kp_b.public_key()),
        ]);
        (
            BlacklistChain::new("coord-a", kp_a),
            BlacklistChain::new("coord-b", kp_b),
            keys,
        )
    }

    #[test]
    fn remote_event_must_extend_head() {
        let (local, remote, keys) = two_chains();
        local.append_local(operator_event("worker-1"), 1_000).unwrap();

        // Remote built on a different history; its event does not chain.
        remote.append_local(operator_event("worker-9"), 500).unwrap();
        let foreign = remote.append_local(operator_event("worker-2"), 2_000).unwrap();
        assert_eq!(
            local.ingest_remote(&foreign, &keys, 3_000).unwrap_err(),
            RegistryError::ChainMismatch
        );
        assert_eq!(local.version(), 1);
    }

    #[test]
    fn remote_event_extending_head_is_accepted() {
        let (a, b, keys) = two_chains();

        let first = a.append_local(operator_event("worker-1"), 1_000).unwrap();
        b.ingest_remote(&first, &keys, 1_100).unwrap();
        assert!(b.is_blacklisted("worker-1", 2_000));

        // And b can extend with its own event that a then accepts.
        let second = b.append_local(operator_event("worker-2"), 2_000).unwrap();
        a.ingest_remote(&second, &keys, 2_100).unwrap();
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn tampered_remote_hash_is_rejected() {
        let (a, b, keys) = two_chains();
        let mut event = a.append_local(operator_event("worker-1"), 1_000).unwrap();
        event.agent_id = "worker-forged".into();
        assert!(matches!(
            b.ingest_remote(&event, &keys, 1_100),
            Err(RegistryError::InvalidBlacklistPayload(_))
        ));
        assert_eq!(b.version(), 0);
    }

    #[test]
    fn remote_event_from_unregistered_coordinator_is_rejected() {
        let (a, b, _) = two_chains();
        // The directory knows nobody.
        let empty = StaticKeys(Vec::new());
        let event = a.append_local(operator_event("worker-1"), 1_000).unwrap();
        assert!(matches!(
            b.ingest_remote(&event, &empty, 1_100),
            Err(RegistryError::UnknownCoordinator(_))
        ));
        assert_eq!(b.version(), 0);
    }

    #[test]
    fn remote_event_signed_by_impostor_is_rejected() {
        let (a, b, _) = two_chains();
        // The directory maps coord-a to a key that never signed the event.
        let impostor = StaticKeys(vec![(
            "coord-a".to_string(),
            Ed25519KeyPair::generate().public_key(),
        )]);
        let event = a.append_local(operator_event("worker-1"), 1_000).unwrap();
        assert_eq!(
            b.ingest_remote(&event, &impostor, 1_100).unwrap_err(),
            RegistryError::CoordinatorSignatureInvalid
        );
        assert_eq!(b.version(), 0);
    }

    #[test]
    fn remote_machine_reason_reverifies_reporter_signature() {
        let kp_a = Arc::new(Ed25519KeyPair::generate());
        let kp_b = Arc::new(Ed25519KeyPair::generate());
        let keys = StaticKeys(vec![
            ("coord-a".to_string(), kp_a.public_key()),
            ("coord-b".to_string(), kp_b.public_key()),
        ]);
        let a = BlacklistChain::new("coord-a", kp_a.clone());
        let b = BlacklistChain::new("coord-b", kp_b);
        let reporter = Ed25519KeyPair::generate();
        let evidence = "cd".repeat(32);

        let event = a
            .append_local(
                NewBlacklistEvent {
                    agent_id: "worker-1".into(),
                    reason_code: BlacklistReasonCode::DosBehavior,
                    reason: "ping flood".into(),
                    evidence_hash_sha256: evidence.clone(),
                    reporter_id: "policy-engine".into(),
                    reporter_signature: Some(
                        sign_reporter_claim(
                            &reporter,
                            "worker-1",
                            &evidence,
                            BlacklistReasonCode::DosBehavior,
                        )
                        .unwrap(),
                    ),
                    reporter_public_key_pem: Some(reporter.public_key().to_pem().unwrap()),
                    expires_at_ms: None,
                },
                1_000,
            )
            .unwrap();
        b.ingest_remote(&event, &keys, 1_100).unwrap();

        // A machine-reason event that chains, hashes, and carries an honest
        // coordinator signature still cannot skip the reporter signature.
        let mut forged = BlacklistRecord {
            event_id: uuid::Uuid::new_v4().to_string(),
            agent_id: "worker-2".into(),
            reason_code: BlacklistReasonCode::DosBehavior,
            reason: "fabricated".into(),
            evidence_hash_sha256: "ef".repeat(32),
            reporter_id: "policy-engine".into(),
            reporter_signature: None,
            reporter_public_key_pem: None,
            source_coordinator_id: "coord-a".into(),
            timestamp_ms: 2_000,
            expires_at_ms: None,
            prev_event_hash: event.event_hash.clone(),
            event_hash: String::new(),
            coordinator_signature: String::new(),
        };
        forged.event_hash =
            sha256_hex(canonical_json(&hashable(&forged)).unwrap().as_bytes());
        forged.coordinator_signature = kp_a.sign(forged.event_hash.as_bytes()).to_hex();

        assert_eq!(
            b.ingest_remote(&forged, &keys, 2_100).unwrap_err(),
            RegistryError::ReporterSignatureInvalid
        );
        assert_eq!(b.version(), 1);
    }
}
