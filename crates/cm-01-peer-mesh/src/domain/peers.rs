//! Peer table with reputation scores.

use dashmap::DashMap;
use shared_crypto::Ed25519PublicKey;
use shared_types::{PeerAdvert, PeerIdentity, PeerRole};

/// Score cap for well-behaved peers.
pub const SCORE_CEILING: i32 = 200;

/// One known peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub identity: PeerIdentity,
    /// URL that actually answered, which wins over the self-reported one.
    pub reachable_url: String,
    pub score: i32,
    pub last_seen_ms: u64,
}

impl PeerEntry {
    /// Parsed Ed25519 key for signature checks.
    pub fn public_key(&self) -> Option<Ed25519PublicKey> {
        Ed25519PublicKey::from_pem(&self.identity.public_key_pem).ok()
    }

    /// Advert form for `peer_exchange`.
    pub fn advert(&self) -> PeerAdvert {
        PeerAdvert {
            peer_id: self.identity.peer_id.clone(),
            public_key: self.identity.public_key_pem.clone(),
            url: self.reachable_url.clone(),
            network_mode: self.identity.network_mode,
            role: self.identity.role,
            last_seen_ms: self.last_seen_ms,
        }
    }
}

/// Concurrent peer table with per-entry locking.
#[derive(Default)]
pub struct PeerTable {
    peers: DashMap<String, PeerEntry>,
}

impl PeerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a peer.
    ///
    /// An existing entry keeps its public key (one key per peer id); an
    /// attempt to swap keys is refused and returns `false`. The reachable
    /// URL is updated when the caller actually reached the peer.
    pub fn add_peer(&self, identity: PeerIdentity, reachable_url: &str, now_ms: u64) -> bool {
        match self.peers.entry(identity.peer_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.identity.public_key_pem != identity.public_key_pem {
                    return false;
                }
                entry.reachable_url = reachable_url.to_string();
                entry.last_seen_ms = now_ms;
                true
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(PeerEntry {
                    identity,
                    reachable_url: reachable_url.to_string(),
                    score: 0,
                    last_seen_ms: now_ms,
                });
                true
            }
        }
    }

    /// Snapshot one peer.
    pub fn get(&self, peer_id: &str) -> Option<PeerEntry> {
        self.peers.get(peer_id).map(|e| e.clone())
    }

    /// Remove a peer (disconnect, key conflict resolution by operator).
    pub fn remove(&self, peer_id: &str) -> Option<PeerEntry> {
        self.peers.remove(peer_id).map(|(_, e)| e)
    }

    /// All peers.
    pub fn all(&self) -> Vec<PeerEntry> {
        self.peers.iter().map(|e| e.clone()).collect()
    }

    /// Coordinator peers only.
    pub fn coordinators(&self) -> Vec<PeerEntry> {
        self.peers
            .iter()
            .filter(|e| e.identity.role == PeerRole::Coordinator)
            .map(|e| e.clone())
            .collect()
    }

    /// Number of known coordinator peers (self excluded; callers add one
    /// when a quorum denominator includes this node).
    pub fn coordinator_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|e| e.identity.role == PeerRole::Coordinator)
            .count()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when the table is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Reward a good message: +1, capped.
    pub fn score_good(&self, peer_id: &str) {
        self.adjust_score(peer_id, 1);
    }

    /// Penalize a bad signature: −5, floored.
    pub fn score_bad_signature(&self, peer_id: &str) {
        self.adjust_score(peer_id, -5);
    }

    /// Penalize rate overflow: −10, floored.
    pub fn score_rate_overflow(&self, peer_id: &str) {
        self.adjust_score(peer_id, -10);
    }

    fn adjust_score(&self, peer_id: &str, delta: i32) {
        if let Some(mut entry) = self.peers.get_mut(peer_id) {
            entry.score = (entry.score + delta).clamp(0, SCORE_CEILING);
        }
    }

    /// Stamp gossip liveness.
    pub fn touch(&self, peer_id: &str, now_ms: u64) {
        if let Some(mut entry) = self.peers.get_mut(peer_id) {
            entry.last_seen_ms = now_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Ed25519KeyPair;
    use shared_types::NetworkMode;

    fn identity(peer_id: &str, pem: &str) -> PeerIdentity {
        PeerIdentity {
            peer_id: peer_id.into(),
            public_key_pem: pem.into(),
            coordinator_url: format!("https://{peer_id}.example.org"),
            network_mode: NetworkMode::Public,
            role: PeerRole::Coordinator,
        }
    }

    #[test]
    fn one_key_per_peer_id() {
        let table = PeerTable::new();
        let pem_a = Ed25519KeyPair::generate().public_key().to_pem().unwrap();
        let pem_b = Ed25519KeyPair::generate().public_key().to_pem().unwrap();

        assert!(table.add_peer(identity("p1", &pem_a), "https://p1", 1));
        assert!(!table.add_peer(identity("p1", &pem_b), "https://p1-other", 2));
        assert_eq!(table.get("p1").unwrap().reachable_url, "https://p1");
    }

    #[test]
    fn score_bounds() {
        let table = PeerTable::new();
        let pem = Ed25519KeyPair::generate().public_key().to_pem().unwrap();
        table.add_peer(identity("p1", &pem), "https://p1", 1);

        table.score_bad_signature("p1");
        assert_eq!(table.get("p1").unwrap().score, 0);

        for _ in 0..300 {
            table.score_good("p1");
        }
        assert_eq!(table.get("p1").unwrap().score, SCORE_CEILING);

        table.score_rate_overflow("p1");
        assert_eq!(table.get("p1").unwrap().score, SCORE_CEILING - 10);
    }
}
