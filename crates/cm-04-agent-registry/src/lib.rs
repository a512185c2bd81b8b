//! # Agent Registry Subsystem
//!
//! Agent lifecycle from registration to soft-destruction: portal-backed
//! enrollment, heartbeat liveness, power-aware scheduling decisions, the
//! sandbox gate, and the signed blacklist chain.
//!
//! ## Registration policy
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Loopback source | approved, portal bypassed |
//! | Portal disabled (no URL configured) | approved |
//! | Portal approves | approved, approval cached |
//! | Portal rejects | `node_not_activated` (403) |
//! | Portal unreachable, agent previously approved | approved (cached) |
//! | Portal unreachable, agent unknown | `node_not_activated` (403) |
//!
//! Liveness: `active` means a heartbeat within the last 120 s.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::outbound::{PortalValidator, PortalVerdict};
pub use service::{RegisterInput, RegisterOutcome, RegistryService};
