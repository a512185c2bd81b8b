//! # Shared Types Crate
//!
//! Cross-subsystem domain types for the CodeMesh coordinator.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here (subtasks, agent records, chain records, mesh envelopes).
//! - **Wire format is camelCase JSON**: all serialized types carry
//!   `rename_all = "camelCase"` so Rust field names never leak into the mesh.
//! - **Envelope-Only Identity**: mesh handlers derive sender identity solely
//!   from the signed envelope's `fromPeerId`, never from payload fields.

pub mod entities;
pub mod envelope;
pub mod events;
pub mod security;

pub use entities::*;
pub use envelope::*;
pub use events::*;
pub use security::*;
