//! # Signed-Request Security
//!
//! Agent-originated routes (`/heartbeat`, `/pull`, `/result`) carry five
//! headers; the signature covers a canonical request string so neither the
//! body nor the route can be replayed elsewhere:
//!
//! ```text
//! method + path + timestampMs + nonce + bodySha256 + peerId
//! ```
//!
//! Replay defense is two-layered: a clock-skew window and a nonce store with
//! TTL. Both reject with `replay_attempt`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_crypto::Ed25519PublicKey;

/// Maximum tolerated clock skew between agent and coordinator.
pub const SECURITY_MAX_SKEW_MS: u64 = 120_000;

/// How long a nonce stays burned after first use.
pub const SECURITY_NONCE_TTL_MS: u64 = 300_000;

/// Header names for signed requests.
pub mod headers {
    /// Agent identity header.
    pub const AGENT_ID: &str = "x-agent-id";
    /// Millisecond timestamp header.
    pub const TIMESTAMP_MS: &str = "x-timestamp-ms";
    /// Per-request nonce header.
    pub const NONCE: &str = "x-nonce";
    /// SHA-256 hex of the request body.
    pub const BODY_SHA256: &str = "x-body-sha256";
    /// Hex Ed25519 signature header.
    pub const SIGNATURE: &str = "x-signature";
}

/// Parsed signed-request headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequestHeaders {
    pub agent_id: String,
    pub timestamp_ms: u64,
    pub nonce: String,
    pub body_sha256: String,
    pub signature: String,
}

/// Build the canonical string the signature covers.
pub fn canonical_request_string(
    method: &str,
    path: &str,
    timestamp_ms: u64,
    nonce: &str,
    body_sha256: &str,
    peer_id: &str,
) -> String {
    format!("{method}{path}{timestamp_ms}{nonce}{body_sha256}{peer_id}")
}

/// Resolves a coordinator id to its registered public key.
///
/// Every ledger that ingests remote records (stats, quorum, blacklist) goes
/// through this directory: a record is persisted only after its signature
/// verifies against the key registered for the id it claims, never against
/// key material the record carries itself.
pub trait KeyDirectory: Send + Sync {
    /// Public key registered for `coordinator_id`, if known.
    fn public_key(&self, coordinator_id: &str) -> Option<Ed25519PublicKey>;
}

/// Replay-defense nonce store.
///
/// `seen` must be a single atomic probe-and-burn: the first caller for a
/// (peer, nonce) pair within the TTL gets `false`, every other caller `true`.
pub trait NonceStore: Send + Sync {
    /// Probe and burn a nonce. Returns `true` when it was already used
    /// within the TTL (a replay).
    fn seen(&self, peer_id: &str, nonce: &str, now_ms: u64) -> bool;

    /// Evict expired nonces.
    fn prune(&self, now_ms: u64);
}

/// In-memory nonce store backed by a sharded concurrent map; probes are O(1).
pub struct InMemoryNonceStore {
    burned: DashMap<(String, String), u64>,
    ttl_ms: u64,
}

impl InMemoryNonceStore {
    /// Store with the standard TTL.
    pub fn new() -> Self {
        Self::with_ttl(SECURITY_NONCE_TTL_MS)
    }

    /// Store with an explicit TTL (tests).
    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            burned: DashMap::new(),
            ttl_ms,
        }
    }

    /// Number of burned nonces currently held.
    pub fn len(&self) -> usize {
        self.burned.len()
    }

    /// True when nothing is burned.
    pub fn is_empty(&self) -> bool {
        self.burned.is_empty()
    }
}

impl Default for InMemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn seen(&self, peer_id: &str, nonce: &str, now_ms: u64) -> bool {
        let key = (peer_id.to_string(), nonce.to_string());
        // Entry API keeps probe-and-burn atomic under the shard lock.
        match self.burned.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let burned_at = *occupied.get();
                if now_ms.saturating_sub(burned_at) <= self.ttl_ms {
                    return true;
                }
                // Expired slot is reusable.
                occupied.insert(now_ms);
                false
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(now_ms);
                false
            }
        }
    }

    fn prune(&self, now_ms: u64) {
        self.burned
            .retain(|_, burned_at| now_ms.saturating_sub(*burned_at) <= self.ttl_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_is_fresh_replay_is_seen() {
        let store = InMemoryNonceStore::new();
        assert!(!store.seen("worker-1", "n-1", 1_000));
        assert!(store.seen("worker-1", "n-1", 2_000));
        // Same nonce from another agent is a different slot.
        assert!(!store.seen("worker-2", "n-1", 2_000));
    }

    #[test]
    fn nonce_slot_reusable_after_ttl() {
        let store = InMemoryNonceStore::with_ttl(1_000);
        assert!(!store.seen("worker-1", "n-1", 1_000));
        assert!(store.seen("worker-1", "n-1", 2_000));
        assert!(!store.seen("worker-1", "n-1", 2_001 + 1_000));
    }

    #[test]
    fn prune_evicts_expired_only() {
        let store = InMemoryNonceStore::with_ttl(1_000);
        store.seen("a", "old", 1_000);
        store.seen("a", "new", 2_500);
        store.prune(2_600);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn canonical_string_layout() {
        assert_eq!(
            canonical_request_string("POST", "/pull", 5, "n", "bd", "worker-1"),
            "POST/pull5nbdworker-1"
        );
    }
}
