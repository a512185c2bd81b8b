//! Ports for the task queue subsystem.

pub mod outbound;
