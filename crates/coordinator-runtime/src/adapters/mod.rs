//! Outbound adapters wiring the subsystem ports to the real world.

pub mod hooks;
pub mod http;

pub use hooks::{CoordinatorHooks, GossipOutbox, PeerKeyDirectory};
pub use http::{
    HttpAnchorClient, HttpInferenceClient, HttpPeerTransport, HttpPortalValidator,
    HttpStatsFetch, LocalAnchor, NullInference,
};
