//! Shared application state.

use crate::direct_work::DirectWorkBoard;
use crate::domain::requests::DiagnosticsRequest;
use crate::domain::GatewayConfig;
use crate::middleware::rate_limit::AgentRateLimiter;
use crate::orchestration::RolloutStore;
use crate::ports::outbound::InferenceClient;
use crate::tunnels::TunnelTable;
use cm_01_peer_mesh::MeshService;
use cm_02_task_queue::{QueueService, TimeSource};
use cm_03_ordering_chain::{ChainService, KeyDirectory};
use cm_04_agent_registry::RegistryService;
use cm_05_settlement::SettlementService;
use parking_lot::Mutex;
use shared_crypto::EnvelopeKeyCache;
use shared_types::NonceStore;
use std::sync::Arc;

/// Everything the handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub time: Arc<dyn TimeSource>,
    pub registry: Arc<RegistryService>,
    pub queue: Arc<QueueService>,
    pub chain: Arc<ChainService>,
    pub mesh: Arc<MeshService>,
    pub settlement: Arc<SettlementService>,
    pub envelope_keys: Arc<EnvelopeKeyCache>,
    pub nonces: Arc<dyn NonceStore>,
    pub inference: Arc<dyn InferenceClient>,
    /// Resolves coordinator ids to keys for stats ingest.
    pub key_directory: Arc<dyn KeyDirectory>,
    pub agent_rate: Arc<AgentRateLimiter>,
    pub tunnels: Arc<TunnelTable>,
    pub direct_work: Arc<DirectWorkBoard>,
    pub rollouts: Arc<RolloutStore>,
    /// Recent agent diagnostics for operator visibility; persistence of
    /// these degrades gracefully.
    pub diagnostics: Arc<Mutex<Vec<DiagnosticsRequest>>>,
    pub started_at_ms: u64,
}

impl AppState {
    /// Milliseconds now, from the injected clock.
    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }
}
