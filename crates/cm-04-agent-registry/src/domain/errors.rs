//! Agent registry error types.

use thiserror::Error;

/// Registry error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Portal rejected the node, or it is unknown while the portal is down.
    #[error("node_not_activated")]
    NodeNotActivated,

    /// The agent is on the blacklist.
    #[error("agent_blacklisted")]
    AgentBlacklisted,

    /// No such agent.
    #[error("agent_not_found: {0}")]
    AgentNotFound(String),

    /// Portal could not be reached.
    #[error("portal_validation_unreachable")]
    PortalUnreachable,

    /// Blacklist payload failed structural validation.
    #[error("invalid_blacklist_payload: {0}")]
    InvalidBlacklistPayload(String),

    /// Machine reason codes require a valid reporter signature.
    #[error("reporter_signature_invalid_for_reason_code")]
    ReporterSignatureInvalid,

    /// Gossiped blacklist event does not chain onto our head.
    #[error("blacklist event does not extend the local chain")]
    ChainMismatch,

    /// Gossiped event claims a coordinator with no registered key.
    #[error("peer_unknown: no key registered for coordinator {0}")]
    UnknownCoordinator(String),

    /// Gossiped event's coordinator signature does not verify.
    #[error("invalid_signature")]
    CoordinatorSignatureInvalid,
}
