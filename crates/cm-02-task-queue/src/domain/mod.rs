//! Domain layer of the task queue subsystem.

pub mod deps;
pub mod entities;
pub mod errors;
pub mod queue;

pub use deps::DependencyTracker;
pub use entities::{AgentPolicy, EnqueueOpts, QueueConfig, QueuedSubtask, WorkerEntry};
pub use errors::QueueError;
pub use queue::TaskQueue;
