//! Mesh configuration.

/// Tunables for gossip validation and peer exchange.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Messages accepted per peer per 10-second window.
    pub rate_limit_per_10s: u32,
    /// Peers advertised in one `peer_exchange` broadcast.
    pub max_peers_in_exchange: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_10s: 50,
            max_peers_in_exchange: 50,
        }
    }
}
