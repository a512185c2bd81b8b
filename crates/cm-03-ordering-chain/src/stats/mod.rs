//! Stats ledger, projections, checkpoints, and peer sync.

pub mod checkpoint;
pub mod ledger;
pub mod projections;
pub mod sync;

pub use checkpoint::CheckpointTally;
pub use ledger::{IngestError, StatsLedger};
pub use projections::{AccountEarnings, EarningsProjection, NodeStatus, NodeStatusProjection};
pub use sync::LedgerSyncer;
