//! # Settlement Subsystem
//!
//! Everything that turns completed work into finalized, anchored value:
//!
//! - **Quorum ledger**: per-coordinator hash chain of issuance proposals,
//!   votes, commits, and checkpoints; logical chains run per epoch.
//! - **Issuance epochs**: rolling contribution shares, a smoothed load
//!   index, a capped-linear daily pool, and per-account allocations,
//!   finalized by majority vote.
//! - **Anchor coordination**: the lexicographically smallest reachable peer
//!   id leads; anchors move `pending -> anchored` on confirmation and demote
//!   back on reorg.
//! - **Payment intents**: `created -> settled | expired`, with a `tx_ref`
//!   set refusing double settlement.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::outbound::AnchorBroadcast;
pub use service::SettlementService;
