//! Chain verification error types.

use thiserror::Error;

/// First failure found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainVerifyError {
    /// Sequence numbers must increase by exactly one, starting at 1.
    #[error("invalid_sequence at index {index}: expected {expected}, got {actual}")]
    InvalidSequence {
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// `prev_hash` does not link to the preceding record (or `GENESIS`).
    #[error("invalid_prev_hash at index {index}")]
    InvalidPrevHash { index: usize },

    /// Recomputed hash differs from the stored hash.
    #[error("hash_mismatch at index {index}")]
    HashMismatch { index: usize },

    /// Signature does not verify against the coordinator's public key.
    #[error("invalid_signature at index {index}")]
    InvalidSignature { index: usize },

    /// Record could not be canonicalized for hashing.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}
