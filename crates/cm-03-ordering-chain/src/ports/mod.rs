//! Ports for the ledger subsystem.

pub mod outbound;
