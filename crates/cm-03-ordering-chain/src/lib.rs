//! # Ledger Subsystem
//!
//! Two hash-chained signed logs and the read models built from them.
//!
//! ## Chains
//!
//! - **Ordering chain**: per-coordinator append-only log of queue events.
//!   Strictly sequential (`sequence = prev + 1`, `prev_hash` linkage starting
//!   at `GENESIS`), each record signed by the owning coordinator.
//! - **Stats ledger**: every ordering record mirrored locally plus records
//!   ingested from peers, each verified against the sending coordinator's
//!   registered public key before persisting.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | `sequence` strictly increments from 1 | `domain/chain.rs` - `append()` / `verify()` |
//! | `prev_hash` links or `GENESIS` | `domain/chain.rs` |
//! | Stored hash matches recomputed hash | `domain/chain.rs` - `verify()` |
//! | Remote records verify against the sender's key | `stats/ledger.rs` - `ingest()` |
//! | Commit only after `floor(K/2)+1` distinct signers | `stats/checkpoint.rs` |
//!
//! Projections (node status, account earnings) are rebuildable from the stats
//! log alone; `rebuild()` proves it in tests.

pub mod domain;
pub mod ports;
pub mod service;
pub mod stats;

pub use domain::{ChainVerifyError, OrderingChain};
pub use ports::outbound::{KeyDirectory, PeerLedgerFetch};
pub use service::{ChainService, TASK_REWARD_CREDITS};
pub use stats::{
    AccountEarnings, CheckpointTally, EarningsProjection, LedgerSyncer, NodeStatus,
    NodeStatusProjection, StatsLedger,
};
