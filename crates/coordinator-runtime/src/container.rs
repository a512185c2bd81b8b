//! Dependency wiring: one function that turns a [`CoordinatorConfig`] into
//! a fully connected coordinator.

use crate::adapters::{
    CoordinatorHooks, GossipOutbox, HttpAnchorClient, HttpInferenceClient, HttpPeerTransport,
    HttpPortalValidator, HttpStatsFetch, LocalAnchor, NullInference, PeerKeyDirectory,
};
use crate::config::CoordinatorConfig;
use anyhow::Context;
use cm_01_peer_mesh::{DiskPeerCache, MeshConfig, MeshService, PeerBootstrap, PeerTable, SocketRegistry};
use cm_02_task_queue::{QueueConfig, QueueService, SystemTimeSource, TimeSource};
use cm_03_ordering_chain::{ChainService, LedgerSyncer, StatsLedger};
use cm_04_agent_registry::{PortalValidator, PowerPolicyConfig, RegistryService};
use cm_05_settlement::{AnchorBroadcast, IssuanceConfig, SettlementService};
use cm_06_gateway::domain::GatewayConfig;
use cm_06_gateway::middleware::rate_limit::AgentRateLimiter;
use cm_06_gateway::ports::outbound::InferenceClient;
use cm_06_gateway::state::AppState;
use cm_06_gateway::{direct_work::DirectWorkBoard, orchestration::RolloutStore, tunnels::TunnelTable};
use parking_lot::Mutex;
use shared_crypto::{hashing::derive_peer_id, Ed25519KeyPair, EnvelopeKeyCache};
use shared_types::{InMemoryNonceStore, KeyDirectory, NetworkMode, PeerIdentity, PeerRole};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A wired coordinator, ready to serve and tick.
pub struct Coordinator {
    pub state: AppState,
    pub bootstrap: Arc<PeerBootstrap>,
    pub syncer: Arc<LedgerSyncer<HttpStatsFetch>>,
    pub outbox: Arc<GossipOutbox>,
    pub config: CoordinatorConfig,
}

/// Load the signing key, generating and persisting one on first boot.
fn load_or_create_keypair(path: &str) -> anyhow::Result<Ed25519KeyPair> {
    let key_path = Path::new(path);
    if key_path.exists() {
        let pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("reading {path}"))?;
        return Ed25519KeyPair::from_pem(&pem)
            .map_err(|e| anyhow::anyhow!("parsing {path}: {e}"));
    }
    let keypair = Ed25519KeyPair::generate();
    let pem = keypair
        .to_pem()
        .map_err(|e| anyhow::anyhow!("serializing new key: {e}"))?;
    std::fs::write(key_path, pem).with_context(|| format!("writing {path}"))?;
    info!(path, "generated new coordinator key");
    Ok(keypair)
}

/// Wire everything.
pub fn build(config: CoordinatorConfig) -> anyhow::Result<Coordinator> {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let now_ms = time.now_ms();

    let keypair = Arc::new(load_or_create_keypair(&config.coordinator_private_key_path)?);
    let public_key_pem = keypair
        .public_key()
        .to_pem()
        .map_err(|e| anyhow::anyhow!("public key PEM: {e}"))?;

    let peer_id = if config.coordinator_peer_id.is_empty() {
        derive_peer_id(&config.coordinator_public_url)
    } else {
        config.coordinator_peer_id.clone()
    };
    let identity = PeerIdentity {
        peer_id: peer_id.clone(),
        public_key_pem,
        coordinator_url: config.coordinator_public_url.clone(),
        network_mode: if config.network_mode == "overlay" {
            NetworkMode::Overlay
        } else {
            NetworkMode::Public
        },
        role: PeerRole::Coordinator,
    };
    info!(peer_id = %identity.peer_id, url = %identity.coordinator_url, "coordinator identity");

    // Core services.
    let stats = Arc::new(StatsLedger::new());
    let chain = Arc::new(ChainService::new(&peer_id, keypair.clone(), stats));
    let queue = Arc::new(QueueService::new(QueueConfig::default(), time.clone()));

    let portal: Arc<dyn PortalValidator> = Arc::new(HttpPortalValidator::new(
        &config.portal_service_url,
        &config.portal_service_token,
    ));
    let registry = Arc::new(RegistryService::new(
        &peer_id,
        keypair.clone(),
        portal,
        PowerPolicyConfig {
            battery_task_stop_level_pct: config.battery_task_stop_level_pct,
            battery_min_pull_interval_ms: config.battery_min_pull_interval_ms,
            ..PowerPolicyConfig::default()
        },
    ));

    let anchor: Arc<dyn AnchorBroadcast> = if config.anchor_service_url.is_empty() {
        Arc::new(LocalAnchor)
    } else {
        Arc::new(HttpAnchorClient::new(&config.anchor_service_url))
    };
    let settlement = Arc::new(SettlementService::new(
        &peer_id,
        keypair.clone(),
        IssuanceConfig {
            window_ms: config.issuance_window_ms,
            recalc_ms: config.issuance_recalc_ms,
            pool_cap: config.issuance_pool_cap,
            ..IssuanceConfig::default()
        },
        &config.anchor_network,
        config.coordinator_fee_bps,
        anchor,
        now_ms,
    ));

    // Mesh.
    let peers = Arc::new(PeerTable::new());
    let sockets = Arc::new(SocketRegistry::new());
    let transport = Arc::new(HttpPeerTransport::new(&config.mesh_token));
    let outbox = Arc::new(GossipOutbox::new());
    let key_directory: Arc<dyn KeyDirectory> = Arc::new(PeerKeyDirectory {
        own_id: peer_id.clone(),
        own_key: keypair.public_key(),
        peers: peers.clone(),
    });
    let hooks = Arc::new(CoordinatorHooks {
        queue: queue.clone(),
        registry: registry.clone(),
        settlement: settlement.clone(),
        peers: peers.clone(),
        keys: key_directory.clone(),
        time: time.clone(),
        outbox: outbox.clone(),
    });
    let mesh = Arc::new(MeshService::new(
        identity.clone(),
        keypair.clone(),
        MeshConfig::default(),
        peers.clone(),
        sockets,
        transport.clone(),
        hooks,
    ));
    let bootstrap = Arc::new(PeerBootstrap::new(
        identity,
        config.coordinator_bootstrap_urls.clone(),
        transport,
        DiskPeerCache::new(&config.peer_cache_path),
    ));
    let syncer = Arc::new(LedgerSyncer::new(Arc::new(HttpStatsFetch::new(
        &config.mesh_token,
    ))));

    let inference: Arc<dyn InferenceClient> = if config.inference_service_url.is_empty() {
        Arc::new(NullInference)
    } else {
        Arc::new(HttpInferenceClient::new(&config.inference_service_url))
    };

    let gateway_config = GatewayConfig {
        mesh_token: config.mesh_token.clone(),
        portal_service_token: config.portal_service_token.clone(),
        agent_rate_limit_max: config.agent_rate_limit_max,
        agent_rate_limit_window_ms: config.agent_rate_limit_window_ms,
        relay_rate_limit_per_10s: config.relay_rate_limit_per_10s,
        tunnel_max_relays_per_min: config.tunnel_max_relays_per_min,
        direct_work_offers_per_10s: config.direct_work_offers_per_10s,
        tunnel_idle_ttl_ms: config.tunnel_idle_ttl_ms,
        payment_intent_ttl_ms: config.payment_intent_ttl_ms,
        offer_claim_delay_ms: config.offer_claim_delay_ms,
        orchestration_online_window_ms: config.agent_orchestration_online_window_ms,
        ..GatewayConfig::default()
    };

    let state = AppState {
        config: Arc::new(gateway_config),
        time,
        registry,
        queue,
        chain,
        mesh,
        settlement,
        envelope_keys: Arc::new(EnvelopeKeyCache::new()),
        nonces: Arc::new(InMemoryNonceStore::new()),
        inference,
        key_directory,
        agent_rate: Arc::new(AgentRateLimiter::new(
            config.agent_rate_limit_max,
            config.agent_rate_limit_window_ms,
        )),
        tunnels: Arc::new(TunnelTable::new()),
        direct_work: Arc::new(DirectWorkBoard::new()),
        rollouts: Arc::new(RolloutStore::new()),
        diagnostics: Arc::new(Mutex::new(Vec::new())),
        started_at_ms: now_ms,
    };

    Ok(Coordinator {
        state,
        bootstrap,
        syncer,
        outbox,
        config,
    })
}
