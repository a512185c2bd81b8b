//! In-process coordinator stacks for integration tests.
//!
//! Builds the same wiring the runtime container does, with deterministic
//! time, a scripted inference service, the local anchor stub, and a
//! `TestNet` transport that routes mesh POSTs between in-process
//! coordinators instead of the network.

use async_trait::async_trait;
use axum::http::HeaderMap;
use cm_01_peer_mesh::ports::outbound::PeerTransport;
use cm_01_peer_mesh::{MeshConfig, MeshService, PeerTable, SocketRegistry};
use cm_02_task_queue::ports::outbound::FixedTimeSource;
use cm_02_task_queue::{QueueConfig, QueueService, TimeSource};
use cm_03_ordering_chain::{ChainService, StatsLedger};
use cm_04_agent_registry::ports::outbound::DisabledPortal;
use cm_04_agent_registry::{PowerPolicyConfig, RegistryService};
use cm_05_settlement::{IssuanceConfig, SettlementService};
use cm_06_gateway::domain::GatewayConfig;
use cm_06_gateway::middleware::rate_limit::AgentRateLimiter;
use cm_06_gateway::ports::outbound::InferenceClient;
use cm_06_gateway::state::AppState;
use cm_06_gateway::{direct_work::DirectWorkBoard, orchestration::RolloutStore, tunnels::TunnelTable};
use coordinator_runtime::adapters::{CoordinatorHooks, GossipOutbox, LocalAnchor, PeerKeyDirectory};
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_crypto::{sha256_hex, Ed25519KeyPair, EnvelopeKeyCache};
use shared_types::security::{canonical_request_string, headers};
use shared_types::{
    InMemoryNonceStore, KeyDirectory, MeshMessage, NetworkMode, PeerIdentity, PeerRole, Subtask,
    SubtaskKind, TaskSubmission,
};
use std::sync::Arc;
use std::time::Duration;

/// Routes mesh traffic between in-process coordinators by URL.
#[derive(Default)]
pub struct TestNet {
    nodes: DashMap<String, Arc<MeshService>>,
    time: Mutex<Option<Arc<dyn TimeSource>>>,
}

impl TestNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, url: &str, mesh: Arc<MeshService>, time: Arc<dyn TimeSource>) {
        self.nodes.insert(url.to_string(), mesh);
        *self.time.lock() = Some(time);
    }

    fn now(&self) -> u64 {
        self.time.lock().as_ref().map(|t| t.now_ms()).unwrap_or(0)
    }
}

#[async_trait]
impl PeerTransport for TestNet {
    async fn fetch_identity(&self, base_url: &str) -> Result<PeerIdentity, String> {
        self.nodes
            .get(base_url)
            .map(|m| m.identity().clone())
            .ok_or_else(|| format!("no node at {base_url}"))
    }

    async fn register_peer(&self, base_url: &str, own: &PeerIdentity) -> Result<(), String> {
        let target = self
            .nodes
            .get(base_url)
            .map(|m| m.clone())
            .ok_or_else(|| format!("no node at {base_url}"))?;
        target
            .table()
            .add_peer(own.clone(), &own.coordinator_url, self.now());
        Ok(())
    }

    async fn post_ingest(&self, base_url: &str, message: &MeshMessage) -> Result<(), String> {
        let target = self
            .nodes
            .get(base_url)
            .map(|m| m.clone())
            .ok_or_else(|| format!("no node at {base_url}"))?;
        target
            .handle_message(message.clone(), self.now())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Inference stub returning a scripted decomposition.
pub struct ScriptedInference {
    pub subtasks: Mutex<Vec<Subtask>>,
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn decompose(&self, _submission: &TaskSubmission) -> Result<Vec<Subtask>, String> {
        let scripted = self.subtasks.lock().clone();
        if scripted.is_empty() {
            return Err("decomposition backend offline".into());
        }
        Ok(scripted)
    }
}

/// One in-process coordinator.
pub struct TestCoordinator {
    pub state: AppState,
    pub keypair: Arc<Ed25519KeyPair>,
    pub time: Arc<FixedTimeSource>,
    pub url: String,
}

impl TestCoordinator {
    /// Build a coordinator named `peer_id` wired into `net`.
    pub fn new(peer_id: &str, net: &Arc<TestNet>, scripted: Vec<Subtask>) -> Self {
        let time = Arc::new(FixedTimeSource::at(1_700_000_000_000));
        let time_dyn: Arc<dyn TimeSource> = time.clone();
        let url = format!("http://{peer_id}.test");

        let keypair = Arc::new(Ed25519KeyPair::generate());
        let identity = PeerIdentity {
            peer_id: peer_id.to_string(),
            public_key_pem: keypair.public_key().to_pem().unwrap(),
            coordinator_url: url.clone(),
            network_mode: NetworkMode::Public,
            role: PeerRole::Coordinator,
        };

        let stats = Arc::new(StatsLedger::new());
        let chain = Arc::new(ChainService::new(peer_id, keypair.clone(), stats));
        let queue = Arc::new(QueueService::new(QueueConfig::default(), time_dyn.clone()));
        let registry = Arc::new(RegistryService::new(
            peer_id,
            keypair.clone(),
            Arc::new(DisabledPortal),
            PowerPolicyConfig::default(),
        ));
        let settlement = Arc::new(SettlementService::new(
            peer_id,
            keypair.clone(),
            IssuanceConfig::default(),
            "testnet",
            250,
            Arc::new(LocalAnchor),
            time.now_ms(),
        ));

        let peers = Arc::new(PeerTable::new());
        let outbox = Arc::new(GossipOutbox::new());
        let key_directory: Arc<dyn KeyDirectory> = Arc::new(PeerKeyDirectory {
            own_id: peer_id.to_string(),
            own_key: keypair.public_key(),
            peers: peers.clone(),
        });
        let hooks = Arc::new(CoordinatorHooks {
            queue: queue.clone(),
            registry: registry.clone(),
            settlement: settlement.clone(),
            peers: peers.clone(),
            keys: key_directory.clone(),
            time: time_dyn.clone(),
            outbox,
        });
        let transport: Arc<dyn PeerTransport> = net.clone() as Arc<dyn PeerTransport>;
        let mesh = Arc::new(MeshService::new(
            identity,
            keypair.clone(),
            MeshConfig::default(),
            peers.clone(),
            Arc::new(SocketRegistry::new()),
            transport,
            hooks,
        ));
        net.register(&url, mesh.clone(), time_dyn.clone());

        let state = AppState {
            config: Arc::new(GatewayConfig::default()),
            time: time_dyn,
            registry,
            queue,
            chain,
            mesh,
            settlement,
            envelope_keys: Arc::new(EnvelopeKeyCache::new()),
            nonces: Arc::new(InMemoryNonceStore::new()),
            inference: Arc::new(ScriptedInference {
                subtasks: Mutex::new(scripted),
            }),
            key_directory,
            agent_rate: Arc::new(AgentRateLimiter::new(10_000, 60_000)),
            tunnels: Arc::new(TunnelTable::new()),
            direct_work: Arc::new(DirectWorkBoard::new()),
            rollouts: Arc::new(RolloutStore::new()),
            diagnostics: Arc::new(Mutex::new(Vec::new())),
            started_at_ms: time.now_ms(),
        };

        Self {
            state,
            keypair,
            time,
            url,
        }
    }

    /// Introduce two coordinators to each other.
    pub fn link(&self, other: &TestCoordinator) {
        let now = self.time.now_ms();
        self.state.mesh.table().add_peer(
            other.state.mesh.identity().clone(),
            &other.url,
            now,
        );
        other.state.mesh.table().add_peer(
            self.state.mesh.identity().clone(),
            &self.url,
            now,
        );
    }
}

/// A test agent with signing and envelope keys.
pub struct TestAgent {
    pub agent_id: String,
    pub keypair: Ed25519KeyPair,
    nonce_counter: Mutex<u64>,
}

impl TestAgent {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            keypair: Ed25519KeyPair::generate(),
            nonce_counter: Mutex::new(0),
        }
    }

    pub fn public_key_pem(&self) -> String {
        self.keypair.public_key().to_pem().unwrap()
    }

    /// Sign a request body the way the agent SDK does.
    pub fn signed_headers(&self, method: &str, path: &str, body: &[u8], now_ms: u64) -> HeaderMap {
        let nonce = {
            let mut counter = self.nonce_counter.lock();
            *counter += 1;
            format!("nonce-{}-{}", self.agent_id, *counter)
        };
        self.signed_headers_with_nonce(method, path, body, now_ms, &nonce)
    }

    /// Same, with an explicit nonce (replay tests).
    pub fn signed_headers_with_nonce(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        now_ms: u64,
        nonce: &str,
    ) -> HeaderMap {
        let body_sha256 = sha256_hex(body);
        let message =
            canonical_request_string(method, path, now_ms, nonce, &body_sha256, &self.agent_id);
        let signature = self.keypair.sign(message.as_bytes()).to_hex();

        let mut map = HeaderMap::new();
        map.insert(headers::AGENT_ID, self.agent_id.parse().unwrap());
        map.insert(headers::TIMESTAMP_MS, now_ms.to_string().parse().unwrap());
        map.insert(headers::NONCE, nonce.parse().unwrap());
        map.insert(headers::BODY_SHA256, body_sha256.parse().unwrap());
        map.insert(headers::SIGNATURE, signature.parse().unwrap());
        map
    }
}

/// Subtask literal for scripted decompositions.
pub fn subtask(id: &str, task_id: &str, depends_on: &[&str]) -> Subtask {
    Subtask {
        id: id.into(),
        task_id: task_id.into(),
        kind: SubtaskKind::SingleStep,
        language: "python".into(),
        input: "double 2".into(),
        timeout_ms: 30_000,
        snapshot_ref: "a".repeat(40),
        project_meta: serde_json::Value::Null,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        requested_model: None,
        tenant_id: None,
        priority: 0,
    }
}

/// Poll until `check` passes or two seconds elapse.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}
