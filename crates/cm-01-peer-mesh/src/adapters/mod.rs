//! Adapters for the peer mesh subsystem.

pub mod cache;
