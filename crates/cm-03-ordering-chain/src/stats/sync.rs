//! # Stats Sync
//!
//! Pull-based replication: periodically read a peer's head; when it is newer
//! than ours, fetch the missing range and ingest with per-record
//! verification. Reorderings across peers are tolerated because records are
//! verified individually and deduped by id.

use crate::ports::outbound::{KeyDirectory, PeerLedgerFetch};
use crate::stats::ledger::StatsLedger;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records fetched per sync round.
const SYNC_BATCH_LIMIT: usize = 500;

/// Pulls missing stats records from peers.
pub struct LedgerSyncer<F: PeerLedgerFetch> {
    fetch: Arc<F>,
}

impl<F: PeerLedgerFetch> LedgerSyncer<F> {
    /// New syncer over a fetch transport.
    pub fn new(fetch: Arc<F>) -> Self {
        Self { fetch }
    }

    /// One sync round against one peer. Returns records accepted.
    pub async fn sync_with_peer(
        &self,
        peer_id: &str,
        peer_url: &str,
        ledger: &StatsLedger,
        keys: &dyn KeyDirectory,
    ) -> usize {
        let remote_head = match self.fetch.head(peer_url).await {
            Ok(Some(head)) => head,
            Ok(None) => return 0,
            Err(error) => {
                debug!(peer_id, error, "stats head fetch failed");
                return 0;
            }
        };

        let local_watermark = ledger.head().map(|r| r.issued_at_ms).unwrap_or(0);
        if remote_head.issued_at_ms <= local_watermark {
            return 0;
        }

        let records = match self
            .fetch
            .range(peer_url, local_watermark, SYNC_BATCH_LIMIT)
            .await
        {
            Ok(records) => records,
            Err(error) => {
                debug!(peer_id, error, "stats range fetch failed");
                return 0;
            }
        };

        match ledger.ingest(&records, keys) {
            Ok(accepted) => {
                if accepted > 0 {
                    debug!(peer_id, accepted, "stats records replicated");
                }
                accepted
            }
            Err(error) => {
                warn!(peer_id, %error, "stats ingest rejected");
                0
            }
        }
    }
}
