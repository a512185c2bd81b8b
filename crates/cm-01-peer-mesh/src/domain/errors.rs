//! Mesh error types.

use thiserror::Error;

/// Why an inbound envelope was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// `now - issued_at_ms` exceeded the envelope TTL.
    #[error("mesh message expired")]
    Expired,

    /// Sender is not in the peer table and the type is not an introduction.
    #[error("peer_unknown: {0}")]
    PeerUnknown(String),

    /// Envelope signature did not verify.
    #[error("signature_invalid")]
    SignatureInvalid,

    /// Sender exceeded its per-10s message budget.
    #[error("peer_rate_limited")]
    PeerRateLimited,

    /// Payload did not parse for the declared type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// `task_offer` payload failed validation.
    #[error("invalid_task_offer_payload: {0}")]
    InvalidTaskOffer(String),
}
