//! Cross-cutting request policies.

pub mod auth;
pub mod rate_limit;
pub mod signed;

pub use auth::{mesh_token_guard, portal_token_ok};
pub use rate_limit::AgentRateLimiter;
pub use signed::verify_signed_request;
