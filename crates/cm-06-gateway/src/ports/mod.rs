//! Ports for the gateway.

pub mod outbound;
