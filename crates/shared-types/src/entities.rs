//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Mesh**: `PeerIdentity`, `PeerRole`, `NetworkMode`
//! - **Agents**: `AgentRecord`, `PowerTelemetry`, `PowerDecision`, `SandboxMode`
//! - **Work**: `Subtask`, `SubtaskKind`, `SubtaskStatus`, `SubtaskResult`,
//!   `TaskSubmission`

use serde::{Deserialize, Serialize};

/// Role a peer plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Coordinator,
    Agent,
    Phone,
}

/// How a peer is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Directly reachable on a public URL.
    Public,
    /// Reachable only through the coordinator's WebSocket push channel.
    Overlay,
}

/// Stable identity of a mesh participant.
///
/// Invariant: for any `peer_id`, exactly one `public_key_pem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    pub peer_id: String,
    /// Ed25519 public key, PEM-serialized.
    pub public_key_pem: String,
    pub coordinator_url: String,
    pub network_mode: NetworkMode,
    pub role: PeerRole,
}

/// Sandbox isolation an agent offers for untrusted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    #[default]
    None,
    Docker,
    Vm,
}

/// Execution mode the agent enrolled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentMode {
    #[serde(rename = "swarm-only")]
    #[default]
    SwarmOnly,
    #[serde(rename = "ide-enabled")]
    IdeEnabled,
}

/// Battery and charger state reported by the agent on heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PowerTelemetry {
    pub on_battery: bool,
    pub battery_level_pct: Option<f64>,
    pub low_power_mode: bool,
}

/// Scheduling decision derived from power telemetry, consumed by `/pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerDecision {
    pub allow_coordinator_tasks: bool,
    pub allow_small_tasks_only: bool,
    pub defer_ms: u64,
    pub reason: String,
}

/// A worker node registered to a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    pub os: String,
    pub version: String,
    pub mode: AgentMode,
    pub local_model_provider: String,
    pub model_catalog: Vec<String>,
    pub active_model: Option<String>,
    pub sandbox_mode: SandboxMode,
    /// Ed25519 public key for signed-request verification, PEM.
    pub public_key_pem: Option<String>,
    /// X25519 public key for task envelopes, hex.
    pub x25519_public_key: Option<String>,
    pub max_concurrent_tasks: u32,
    pub power: Option<PowerTelemetry>,
    pub owner_email: String,
    pub last_seen_ms: u64,
    pub connected_peers: Vec<String>,
}

/// Shape of a decomposed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    MicroLoop,
    SingleStep,
}

/// Lifecycle state of a subtask. `Completed` and `RemoteClaimed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtaskStatus {
    Queued,
    Held,
    Claimed,
    Completed,
    RemoteClaimed,
}

/// A single executable unit produced by decomposing a submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub kind: SubtaskKind,
    pub language: String,
    pub input: String,
    pub timeout_ms: u64,
    pub snapshot_ref: String,
    #[serde(default)]
    pub project_meta: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub requested_model: Option<String>,
    /// Tenants that demand sandboxed execution set this.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Result posted by the agent after executing a subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskResult {
    pub subtask_id: String,
    pub task_id: String,
    pub ok: bool,
    #[serde(default)]
    pub output: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// A task submitted for decomposition and mesh execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    pub task_id: String,
    pub prompt: String,
    pub language: String,
    pub snapshot_ref: String,
    #[serde(default)]
    pub project_meta: serde_json::Value,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtask_wire_format_is_camel_case() {
        let s = Subtask {
            id: "S1".into(),
            task_id: "T1".into(),
            kind: SubtaskKind::SingleStep,
            language: "python".into(),
            input: "double 2".into(),
            timeout_ms: 30_000,
            snapshot_ref: "a".repeat(40),
            project_meta: serde_json::Value::Null,
            depends_on: vec![],
            requested_model: None,
            tenant_id: None,
            priority: 0,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"taskId\":\"T1\""));
        assert!(json.contains("\"timeoutMs\":30000"));
        assert!(json.contains("\"kind\":\"single_step\""));
    }

    #[test]
    fn status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&SubtaskStatus::RemoteClaimed).unwrap(),
            "\"remote-claimed\""
        );
    }
}
