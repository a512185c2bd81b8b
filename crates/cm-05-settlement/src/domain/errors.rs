//! Settlement error types.

use thiserror::Error;

/// Settlement error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Voter is not an approved coordinator.
    #[error("coordinator_not_approved: {0}")]
    CoordinatorNotApproved(String),

    /// A quorum denominator of zero coordinators is meaningless.
    #[error("invalid_quorum_threshold")]
    InvalidQuorumThreshold,

    /// `tx_ref` was already used to settle an intent.
    #[error("duplicate_tx_ref_rejected")]
    DuplicateTxRef,

    /// No such payment intent.
    #[error("intent_not_found: {0}")]
    IntentNotFound(String),

    /// The intent's TTL elapsed before confirmation.
    #[error("intent_expired: {0}")]
    IntentExpired(String),

    /// No such issuance epoch.
    #[error("epoch not found: {0}")]
    EpochNotFound(String),

    /// Quorum record failed canonicalization or signing.
    #[error("quorum record build failed: {0}")]
    RecordBuild(String),

    /// Gossiped record's hash or signature does not verify against the
    /// registered key of its claimed coordinator.
    #[error("invalid_signature")]
    SignatureInvalid,
}
