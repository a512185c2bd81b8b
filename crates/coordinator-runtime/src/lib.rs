//! # Coordinator Runtime
//!
//! Configuration, key custody, dependency wiring, and the background loops.
//! `main.rs` is a thin shell over [`container::build`] and
//! [`loops::spawn_all`].

pub mod adapters;
pub mod config;
pub mod container;
pub mod loops;

pub use config::CoordinatorConfig;
pub use container::{build, Coordinator};
