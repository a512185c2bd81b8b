//! Ports for the peer mesh subsystem.

pub mod outbound;
