//! Request and response bodies for the HTTP surface.
//!
//! All wire names are camelCase. Parse failures surface as 400s with the
//! offending field path (serde's error message carries it).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_crypto::SealedPayload;
use shared_types::{
    AgentMode, BlacklistReasonCode, ChainRecord, PowerDecision, PowerTelemetry, SandboxMode,
    Subtask,
};

// =============================================================================
// AGENT-FACING
// =============================================================================

/// `POST /register`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub agent_id: String,
    pub registration_token: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mode: AgentMode,
    #[serde(default)]
    pub owner_email: String,
    #[serde(default)]
    pub sandbox_mode: SandboxMode,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub local_model_provider: String,
    #[serde(default)]
    pub model_catalog: Vec<String>,
    #[serde(default)]
    pub active_model: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub x25519_public_key: Option<String>,
}

fn default_concurrency() -> u32 {
    1
}

/// `POST /register` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub accepted: bool,
    pub policy: AgentPolicyView,
    pub mode: AgentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_token: Option<String>,
}

/// Policy echoed back to the agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPolicyView {
    pub max_concurrent_tasks: u32,
}

/// `POST /heartbeat`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub agent_id: String,
    #[serde(default)]
    pub power: Option<PowerTelemetry>,
    #[serde(default)]
    pub active_model: Option<String>,
}

/// `POST /heartbeat` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklisted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PowerDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<Value>,
    pub tunnel_invites: Vec<Value>,
    pub tunnel_close_notices: Vec<Value>,
    pub tunnel_frames: Vec<Value>,
    pub direct_work_offers: Vec<Value>,
    pub blacklist: BlacklistDelta,
}

/// Blacklist summary piggybacked on heartbeats.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistDelta {
    pub version: u64,
    pub agents: Vec<String>,
}

/// `POST /pull`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub agent_id: String,
    #[serde(default)]
    pub preferred_model: Option<String>,
}

/// `POST /pull` response.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub subtask: Option<Subtask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<SealedPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_deferred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defer_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `POST /result`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    pub subtask_id: String,
    pub task_id: String,
    pub ok: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    /// Encrypted output; when present it replaces `output` after decryption.
    #[serde(default)]
    pub envelope: Option<SealedPayload>,
}

/// `POST /agent/diagnostics`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsRequest {
    pub agent_id: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub detail: Value,
}

// =============================================================================
// SUBMITTER-FACING
// =============================================================================

/// `POST /submit`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub task_id: String,
    pub prompt: String,
    pub language: String,
    pub snapshot_ref: String,
    #[serde(default)]
    pub project_meta: Value,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// `POST /submit` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: String,
    pub subtasks: Vec<String>,
}

// =============================================================================
// MESH / LEDGER
// =============================================================================

/// `POST /stats/ledger/ingest`
#[derive(Debug, Clone, Deserialize)]
pub struct StatsIngestRequest {
    pub records: Vec<ChainRecord>,
}

/// `POST /security/blacklist`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistPostRequest {
    pub agent_id: String,
    pub reason_code: BlacklistReasonCode,
    #[serde(default)]
    pub reason: String,
    pub evidence_hash_sha256: String,
    pub reporter_id: String,
    #[serde(default)]
    pub reporter_signature: Option<String>,
    #[serde(default)]
    pub reporter_public_key_pem: Option<String>,
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
}

// =============================================================================
// AGENT MESH (tunnels, direct work, model requests)
// =============================================================================

/// `POST /agent-mesh/connect`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConnectRequest {
    pub from_agent_id: String,
    pub to_agent_id: String,
}

/// `POST /agent-mesh/{accept,close,close-ack}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRefRequest {
    pub tunnel_id: String,
    pub agent_id: String,
}

/// `POST /agent-mesh/relay`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelRelayRequest {
    pub tunnel_id: String,
    pub from_agent_id: String,
    pub payload: String,
}

/// `POST /agent-mesh/direct-work/offer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectWorkOfferRequest {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub payload: Value,
}

/// `POST /agent-mesh/direct-work/{accept,result}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectWorkRefRequest {
    pub offer_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub output: Option<Value>,
}

/// `POST /agent-mesh/models/request`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequestBody {
    pub requester_id: String,
    pub model: String,
}

// =============================================================================
// ORCHESTRATION
// =============================================================================

/// `POST /orchestration/agents/:agentId/status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatusRequest {
    pub rollout_id: String,
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// `POST /orchestration/agents/:agentId/ack`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutAckRequest {
    pub rollout_id: String,
}

// =============================================================================
// ECONOMY
// =============================================================================

/// `POST /economy/payments/intents`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub account_id: String,
    pub credits: u64,
}

/// `POST /economy/payments/intents/:id/confirm`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmIntentRequest {
    pub tx_ref: String,
}

/// `POST /economy/price-epochs/propose`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceProposalRequest {
    pub credits_per_subtask: u64,
}
