//! # Peer Mesh Subsystem
//!
//! Signed gossip between coordinators (and push to overlay agents), the peer
//! table with its reputation scores, and the bootstrap cycle that discovers
//! and mutually registers peers.
//!
//! ## Validation pipeline
//!
//! Every inbound envelope runs, in order: TTL check, known-peer lookup
//! (`peer_exchange` and `capability_announce` excepted, since they are the
//! introduction mechanism), signature verification, and a per-peer rate
//! limit. Scores move +1 on good messages (capped at 200), −5 on bad
//! signatures, −10 on rate overflow, floored at 0.
//!
//! ## Ownership
//!
//! The mesh service holds no reference to the queue, registry, or ledgers;
//! gossip effects flow through the [`ports::outbound::GossipHooks`] trait
//! the runtime wires up.

pub mod adapters;
pub mod bootstrap;
pub mod domain;
pub mod ports;
pub mod service;
pub mod sockets;

pub use adapters::cache::DiskPeerCache;
pub use bootstrap::PeerBootstrap;
pub use domain::*;
pub use service::{IngestOutcome, MeshService};
pub use sockets::SocketRegistry;
