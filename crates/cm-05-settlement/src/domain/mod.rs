//! Domain layer of the settlement subsystem.

pub mod anchor;
pub mod errors;
pub mod issuance;
pub mod payments;
pub mod pricing;
pub mod quorum;

pub use anchor::{elect_leader, AnchorRecord, AnchorStatus, AnchorStore};
pub use errors::SettlementError;
pub use issuance::{Allocation, IssuanceConfig, IssuanceEngine, IssuanceEpoch};
pub use payments::{PaymentIntent, PaymentIntentStatus, PaymentLedger};
pub use pricing::{PriceBook, PriceEpoch, TreasuryPolicy};
pub use quorum::QuorumLedger;
