//! WebSocket peer registry.
//!
//! Agents behind NAT hold a persistent socket so the coordinator can push
//! without inbound connectivity. The gateway's WS handler registers a sender
//! per peer; on disconnect the entry is dropped and the next peer-exchange
//! cycle re-advertises the peer.

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Map of `peer_id -> live socket sender` (serialized frames).
#[derive(Default)]
pub struct SocketRegistry {
    sockets: DashMap<String, UnboundedSender<String>>,
}

impl SocketRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer's socket, replacing any previous one.
    pub fn attach(&self, peer_id: &str, sender: UnboundedSender<String>) {
        debug!(peer_id, "mesh socket attached");
        self.sockets.insert(peer_id.to_string(), sender);
    }

    /// Detach on disconnect.
    pub fn detach(&self, peer_id: &str) {
        debug!(peer_id, "mesh socket detached");
        self.sockets.remove(peer_id);
    }

    /// True when the peer holds a live socket.
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.sockets.contains_key(peer_id)
    }

    /// Push a frame; a closed socket is detached lazily.
    pub fn send(&self, peer_id: &str, frame: &str) -> bool {
        let sender = match self.sockets.get(peer_id) {
            Some(entry) => entry.clone(),
            None => return false,
        };
        if sender.send(frame.to_string()).is_ok() {
            true
        } else {
            self.sockets.remove(peer_id);
            false
        }
    }

    /// Live socket count.
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// True when no sockets are attached.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}
