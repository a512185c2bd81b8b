//! Ports for the agent registry subsystem.

pub mod outbound;
