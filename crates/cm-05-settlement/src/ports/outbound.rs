//! Outbound (driven) ports for the settlement subsystem.

use async_trait::async_trait;

/// The external settlement-chain broadcaster.
///
/// The coordinator records intent; actual broadcast, fee handling, and
/// confirmation tracking are the anchor service's problem.
#[async_trait]
pub trait AnchorBroadcast: Send + Sync {
    /// Submit a checkpoint hash; returns the transaction reference.
    async fn submit(&self, checkpoint_hash: &str) -> Result<String, String>;

    /// True while the transaction is visible on the longest chain.
    async fn verify(&self, checkpoint_hash: &str, tx_ref: &str) -> Result<bool, String>;
}
