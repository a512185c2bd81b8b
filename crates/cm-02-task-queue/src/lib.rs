//! # Task Queue Subsystem
//!
//! Queues, dispatches, and tracks subtasks produced by task decomposition.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | One claimant per subtask | `domain/queue.rs` - `claim()` under the queue lock |
//! | Deterministic claim order | `domain/queue.rs` - `QueueKey` ordering |
//! | Claim delay window honored | `domain/queue.rs` - `claim()` eligibility check |
//! | Held subtasks release only when all predecessors complete | `domain/deps.rs` |
//! | Circular batches never deadlock | `domain/deps.rs` - `detect_circular()` |
//!
//! ## Claim ordering
//!
//! Priority descending, then enqueue time ascending, then lexicographically
//! smallest subtask id. `claim_delay_ms` keeps a subtask invisible to local
//! claims so a peer coordinator has a window to take it via gossip, even when
//! the queue is otherwise empty.
//!
//! ## Module Structure
//!
//! ```text
//! ports/outbound.rs - TimeSource
//! domain/queue.rs   - TaskQueue (single-lock mutators)
//! domain/deps.rs    - DependencyTracker (no queue reference; enqueue closure)
//! service.rs        - QueueService: lock owner, batch intake, release wiring
//! ```

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::outbound::{SystemTimeSource, TimeSource};
pub use service::QueueService;
