//! Ports for the settlement subsystem.

pub mod outbound;
