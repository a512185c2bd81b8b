//! Outbound (driven) ports for the ledger subsystem.

use async_trait::async_trait;
use shared_types::ChainRecord;

/// Stats ingest refuses records from coordinators it cannot resolve; the
/// directory itself is shared with the other ingesting ledgers.
pub use shared_types::KeyDirectory;

/// Fetches ledger state from a peer coordinator over the mesh.
#[async_trait]
pub trait PeerLedgerFetch: Send + Sync {
    /// The peer's newest stats record, if it has any.
    async fn head(&self, peer_url: &str) -> Result<Option<ChainRecord>, String>;

    /// Records with `issued_at_ms > since_issued_at_ms`, oldest first.
    async fn range(
        &self,
        peer_url: &str,
        since_issued_at_ms: u64,
        limit: usize,
    ) -> Result<Vec<ChainRecord>, String>;
}
