//! # Gateway Subsystem
//!
//! The coordinator's HTTP/WS surface. Ties the queue, registry, ledgers,
//! mesh, and settlement together and enforces the cross-cutting policies:
//!
//! ## Authentication layers (applied in order)
//!
//! 1. **Mesh token**: constant-time compare on every route except
//!    `/register` and `/mesh/ws` (which authenticates via query parameter);
//!    projection routes accept the portal service token instead.
//! 2. **Signed requests**: `/heartbeat`, `/pull`, `/result` verify the five
//!    `x-*` headers against the agent's registered public key, with clock
//!    skew and nonce-replay defense.
//! 3. **Per-agent rate limits**: token buckets; loopback bypasses rate
//!    limits but never signatures.
//!
//! ## Module Structure
//!
//! ```text
//! domain/      - ApiError taxonomy, gateway config, request/response DTOs
//! middleware/  - mesh token guard, signed-request verification, rate limits
//! routes/      - one module per §route family, assembled in routes::build_router
//! tunnels.rs   - agent-to-agent tunnel table with relay caps and GC
//! direct_work.rs - direct-work offers and model-fetch requests
//! orchestration.rs - coordinator-driven rollouts (Ollama install)
//! ws.rs        - /mesh/ws upgrade and socket lifecycle
//! ```

pub mod direct_work;
pub mod domain;
pub mod middleware;
pub mod orchestration;
pub mod ports;
pub mod routes;
pub mod state;
pub mod tunnels;
pub mod ws;

pub use domain::error::ApiError;
pub use routes::build_router;
pub use state::AppState;
