//! HTTP adapters for the portal, inference, anchor, and peer transports.
//!
//! Every outbound call has an explicit timeout: portal validation 5 s,
//! decomposition 5 s, mesh identity/register 8 s.

use async_trait::async_trait;
use cm_01_peer_mesh::ports::outbound::PeerTransport;
use cm_03_ordering_chain::PeerLedgerFetch;
use cm_04_agent_registry::{PortalValidator, PortalVerdict};
use cm_05_settlement::AnchorBroadcast;
use cm_06_gateway::ports::outbound::InferenceClient;
use serde_json::{json, Value};
use shared_crypto::sha256_hex;
use shared_types::{ChainRecord, MeshMessage, PeerIdentity, Subtask, TaskSubmission};
use std::time::Duration;

const PORTAL_TIMEOUT: Duration = Duration::from_secs(5);
const INFERENCE_TIMEOUT: Duration = Duration::from_secs(5);
const MESH_TIMEOUT: Duration = Duration::from_secs(8);

fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

// =============================================================================
// PEER TRANSPORT
// =============================================================================

/// reqwest-backed [`PeerTransport`] with the mesh token attached.
pub struct HttpPeerTransport {
    http: reqwest::Client,
    mesh_token: String,
}

impl HttpPeerTransport {
    /// Transport using `mesh_token` on every call.
    pub fn new(mesh_token: &str) -> Self {
        Self {
            http: client(MESH_TIMEOUT),
            mesh_token: mesh_token.to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn fetch_identity(&self, base_url: &str) -> Result<PeerIdentity, String> {
        self.http
            .get(format!("{base_url}/identity"))
            .header("meshtoken", &self.mesh_token)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())
    }

    async fn register_peer(&self, base_url: &str, own: &PeerIdentity) -> Result<(), String> {
        self.http
            .post(format!("{base_url}/mesh/register-peer"))
            .header("meshtoken", &self.mesh_token)
            .json(own)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn post_ingest(&self, base_url: &str, message: &MeshMessage) -> Result<(), String> {
        self.http
            .post(format!("{base_url}/mesh/ingest"))
            .header("meshtoken", &self.mesh_token)
            .json(message)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// =============================================================================
// STATS FETCH
// =============================================================================

/// reqwest-backed [`PeerLedgerFetch`] for the stats sync loop.
pub struct HttpStatsFetch {
    http: reqwest::Client,
    mesh_token: String,
}

impl HttpStatsFetch {
    /// Fetcher using `mesh_token`.
    pub fn new(mesh_token: &str) -> Self {
        Self {
            http: client(MESH_TIMEOUT),
            mesh_token: mesh_token.to_string(),
        }
    }
}

#[async_trait]
impl PeerLedgerFetch for HttpStatsFetch {
    async fn head(&self, peer_url: &str) -> Result<Option<ChainRecord>, String> {
        let body: Value = self
            .http
            .get(format!("{peer_url}/stats/ledger/head"))
            .header("meshtoken", &self.mesh_token)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        match body.get("head") {
            Some(Value::Null) | None => Ok(None),
            Some(head) => serde_json::from_value(head.clone())
                .map(Some)
                .map_err(|e| e.to_string()),
        }
    }

    async fn range(
        &self,
        peer_url: &str,
        since_issued_at_ms: u64,
        limit: usize,
    ) -> Result<Vec<ChainRecord>, String> {
        let body: Value = self
            .http
            .get(format!(
                "{peer_url}/stats/ledger/range?sinceIssuedAtMs={since_issued_at_ms}&limit={limit}"
            ))
            .header("meshtoken", &self.mesh_token)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        serde_json::from_value(body.get("records").cloned().unwrap_or(Value::Null))
            .map_err(|e| e.to_string())
    }
}

// =============================================================================
// PORTAL
// =============================================================================

/// reqwest-backed `validateNode` call.
pub struct HttpPortalValidator {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPortalValidator {
    /// Validator against `base_url`; an empty URL disables validation.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: client(PORTAL_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl PortalValidator for HttpPortalValidator {
    async fn validate_node(
        &self,
        agent_id: &str,
        registration_token: &str,
    ) -> Result<PortalVerdict, ()> {
        let response = self
            .http
            .post(format!("{}/validateNode", self.base_url))
            .header("x-portal-token", &self.token)
            .json(&json!({
                "agentId": agent_id,
                "registrationToken": registration_token,
            }))
            .send()
            .await
            .map_err(|_| ())?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Ok(PortalVerdict::Rejected);
        }
        let body: Value = response
            .error_for_status()
            .map_err(|_| ())?
            .json()
            .await
            .map_err(|_| ())?;
        if body.get("approved").and_then(Value::as_bool).unwrap_or(false) {
            Ok(PortalVerdict::Approved {
                owner_email: body
                    .get("ownerEmail")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        } else {
            Ok(PortalVerdict::Rejected)
        }
    }

    fn disabled(&self) -> bool {
        self.base_url.is_empty()
    }
}

// =============================================================================
// INFERENCE
// =============================================================================

/// reqwest-backed `decompose` call.
pub struct HttpInferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInferenceClient {
    /// Client against `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: client(INFERENCE_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn decompose(&self, submission: &TaskSubmission) -> Result<Vec<Subtask>, String> {
        let body: Value = self
            .http
            .post(format!("{}/decompose", self.base_url))
            .json(submission)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        serde_json::from_value(body.get("subtasks").cloned().unwrap_or(Value::Null))
            .map_err(|e| e.to_string())
    }
}

/// Inference stub for coordinators without a decomposition service.
pub struct NullInference;

#[async_trait]
impl InferenceClient for NullInference {
    async fn decompose(&self, _submission: &TaskSubmission) -> Result<Vec<Subtask>, String> {
        Err("no inference service configured".into())
    }
}

// =============================================================================
// ANCHOR
// =============================================================================

/// reqwest-backed settlement-chain broadcaster.
pub struct HttpAnchorClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAnchorClient {
    /// Client against `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: client(MESH_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AnchorBroadcast for HttpAnchorClient {
    async fn submit(&self, checkpoint_hash: &str) -> Result<String, String> {
        let body: Value = self
            .http
            .post(format!("{}/anchors", self.base_url))
            .json(&json!({"checkpointHash": checkpoint_hash}))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        body.get("txRef")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "anchor service returned no txRef".into())
    }

    async fn verify(&self, checkpoint_hash: &str, tx_ref: &str) -> Result<bool, String> {
        let body: Value = self
            .http
            .get(format!(
                "{}/anchors/verify?checkpointHash={checkpoint_hash}&txRef={tx_ref}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        Ok(body.get("found").and_then(Value::as_bool).unwrap_or(false))
    }
}

/// Anchor stub for single-node meshes: the "chain" is local and always
/// confirms.
pub struct LocalAnchor;

#[async_trait]
impl AnchorBroadcast for LocalAnchor {
    async fn submit(&self, checkpoint_hash: &str) -> Result<String, String> {
        Ok(format!("local-{}", &sha256_hex(checkpoint_hash.as_bytes())[..12]))
    }

    async fn verify(&self, _checkpoint_hash: &str, _tx_ref: &str) -> Result<bool, String> {
        Ok(true)
    }
}
