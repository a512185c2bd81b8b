//! # Peer Bootstrap
//!
//! On startup and every 45 seconds: build the candidate list from the peer
//! table, the disk cache, and the configured seed list; fetch each
//! candidate's identity; mutually register; cache the URLs that answered.
//! The URL that actually answered becomes the peer's gossip address (a
//! peer's self-reported URL may be unreachable behind a proxy).

use crate::adapters::cache::DiskPeerCache;
use crate::domain::PeerTable;
use crate::ports::outbound::PeerTransport;
use shared_types::PeerIdentity;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Bootstrap cycle runner.
pub struct PeerBootstrap {
    own: PeerIdentity,
    seeds: Vec<String>,
    transport: Arc<dyn PeerTransport>,
    cache: DiskPeerCache,
}

impl PeerBootstrap {
    /// Build the runner.
    pub fn new(
        own: PeerIdentity,
        seeds: Vec<String>,
        transport: Arc<dyn PeerTransport>,
        cache: DiskPeerCache,
    ) -> Self {
        Self {
            own,
            seeds,
            transport,
            cache,
        }
    }

    /// One bootstrap cycle. Returns how many peers answered.
    pub async fn run_cycle(&self, table: &PeerTable, now_ms: u64) -> usize {
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for peer in table.all() {
            candidates.insert(peer.reachable_url.clone());
        }
        candidates.extend(self.cache.load());
        candidates.extend(self.seeds.iter().cloned());
        candidates.remove(&self.own.coordinator_url);

        let mut reached = Vec::new();
        for url in candidates {
            let identity = match self.transport.fetch_identity(&url).await {
                Ok(identity) => identity,
                Err(error) => {
                    debug!(url, error, "bootstrap candidate unreachable");
                    continue;
                }
            };
            if identity.peer_id == self.own.peer_id
                || identity.coordinator_url == self.own.coordinator_url
            {
                continue;
            }

            table.add_peer(identity, &url, now_ms);
            if let Err(error) = self.transport.register_peer(&url, &self.own).await {
                debug!(url, error, "mutual registration failed");
            }
            reached.push(url);
        }

        if !reached.is_empty() {
            if let Err(error) = self.cache.save(&reached) {
                debug!(%error, "peer cache write failed");
            }
        }
        reached.len()
    }
}
