//! Domain layer of the agent registry.

pub mod agents;
pub mod blacklist;
pub mod errors;
pub mod power;

pub use agents::{AgentDirectory, AGENT_ACTIVE_WINDOW_MS};
pub use blacklist::{BlacklistChain, NewBlacklistEvent};
pub use errors::RegistryError;
pub use power::PowerPolicyConfig;
