//! # Stats Ledger
//!
//! The globally-replicated subset of ordering chains. Local records are
//! mirrored in as they are appended; remote records arrive through the sync
//! loop or `POST /stats/ledger/ingest` and each one is verified against the
//! sending coordinator's registered public key before persisting.

use crate::domain::{ChainVerifyError, OrderingChain};
use crate::ports::outbound::KeyDirectory;
use crate::stats::projections::{EarningsProjection, NodeStatusProjection};
use parking_lot::{Mutex, RwLock};
use shared_types::ChainRecord;
use std::collections::HashSet;
use thiserror::Error;

/// Why a remote record was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The sending coordinator has no registered public key.
    #[error("peer_unknown: no key registered for coordinator {0}")]
    UnknownCoordinator(String),

    /// The record failed hash or signature verification.
    #[error(transparent)]
    Verify(#[from] ChainVerifyError),
}

#[derive(Default)]
struct LedgerInner {
    records: Vec<ChainRecord>,
    seen: HashSet<String>,
}

/// Replicated stats log plus its projections.
#[derive(Default)]
pub struct StatsLedger {
    inner: Mutex<LedgerInner>,
    node_status: RwLock<NodeStatusProjection>,
    earnings: RwLock<EarningsProjection>,
}

impl StatsLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a locally appended (already signed) record.
    pub fn mirror_local(&self, record: &ChainRecord) {
        let mut inner = self.inner.lock();
        if inner.seen.insert(record.id.clone()) {
            inner.records.push(record.clone());
            drop(inner);
            self.project(record);
        }
    }

    /// Ingest remote records, verifying each against the sender's registered
    /// key. Returns how many records were newly persisted; the first
    /// verification failure aborts the batch.
    pub fn ingest(
        &self,
        records: &[ChainRecord],
        keys: &dyn KeyDirectory,
    ) -> Result<usize, IngestError> {
        let mut accepted = 0;
        for record in records {
            let key = keys
                .public_key(&record.coordinator_id)
                .ok_or_else(|| IngestError::UnknownCoordinator(record.coordinator_id.clone()))?;
            OrderingChain::verify_record(record, &key)?;

            let mut inner = self.inner.lock();
            if inner.seen.insert(record.id.clone()) {
                inner.records.push(record.clone());
                drop(inner);
                self.project(record);
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn project(&self, record: &ChainRecord) {
        self.node_status.write().apply(record);
        self.earnings.write().apply(record);
    }

    /// Newest record by ingest order.
    pub fn head(&self) -> Option<ChainRecord> {
        self.inner.lock().records.last().cloned()
    }

    /// Records strictly newer than `since_issued_at_ms`, oldest first,
    /// capped at `limit`.
    pub fn range(&self, since_issued_at_ms: u64, limit: usize) -> Vec<ChainRecord> {
        let inner = self.inner.lock();
        let mut out: Vec<ChainRecord> = inner
            .records
            .iter()
            .filter(|r| r.issued_at_ms > since_issued_at_ms)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.issued_at_ms);
        out.truncate(limit);
        out
    }

    /// Total persisted records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// True when nothing is persisted.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Full copy (diagnostics and tests).
    pub fn snapshot(&self) -> Vec<ChainRecord> {
        self.inner.lock().records.clone()
    }

    /// Read access to the node-status projection.
    pub fn with_node_status<R>(&self, f: impl FnOnce(&NodeStatusProjection) -> R) -> R {
        f(&self.node_status.read())
    }

    /// Read access to the earnings projection.
    pub fn with_earnings<R>(&self, f: impl FnOnce(&EarningsProjection) -> R) -> R {
        f(&self.earnings.read())
    }

    /// Mutate the earnings projection (payment settlement path).
    pub fn with_earnings_mut<R>(&self, f: impl FnOnce(&mut EarningsProjection) -> R) -> R {
        f(&mut self.earnings.write())
    }

    /// Rebuild both projections from the log. Used on restart and asserted
    /// equivalent to the incremental fold in tests.
    pub fn rebuild_projections(&self) {
        let records = self.snapshot();
        *self.node_status.write() = NodeStatusProjection::rebuild(&records);
        *self.earnings.write() = EarningsProjection::rebuild(&records);
    }
}
