//! Agent directory: capabilities, liveness, and soft destruction.

use dashmap::DashMap;
use shared_types::{AgentRecord, PowerTelemetry};

/// Heartbeat window inside which an agent counts as active.
pub const AGENT_ACTIVE_WINDOW_MS: u64 = 120_000;

/// Concurrent map of known agents with per-entry locking.
#[derive(Default)]
pub struct AgentDirectory {
    agents: DashMap<String, AgentRecord>,
}

impl AgentDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace an agent record.
    pub fn install(&self, record: AgentRecord) {
        self.agents.insert(record.agent_id.clone(), record);
    }

    /// Stamp liveness and merge heartbeat-reported telemetry.
    pub fn heartbeat(
        &self,
        agent_id: &str,
        power: Option<PowerTelemetry>,
        active_model: Option<String>,
        now_ms: u64,
    ) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut agent) => {
                agent.last_seen_ms = now_ms;
                if power.is_some() {
                    agent.power = power;
                }
                if active_model.is_some() {
                    agent.active_model = active_model;
                }
                true
            }
            None => false,
        }
    }

    /// Snapshot one agent.
    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|r| r.clone())
    }

    /// True when the agent heartbeated within the active window.
    pub fn is_active(&self, agent_id: &str, now_ms: u64) -> bool {
        self.agents
            .get(agent_id)
            .map(|a| now_ms.saturating_sub(a.last_seen_ms) <= AGENT_ACTIVE_WINDOW_MS)
            .unwrap_or(false)
    }

    /// All agents currently inside the active window.
    pub fn live_agents(&self, now_ms: u64) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|a| now_ms.saturating_sub(a.last_seen_ms) <= AGENT_ACTIVE_WINDOW_MS)
            .map(|a| a.clone())
            .collect()
    }

    /// Count of live agents.
    pub fn live_count(&self, now_ms: u64) -> usize {
        self.agents
            .iter()
            .filter(|a| now_ms.saturating_sub(a.last_seen_ms) <= AGENT_ACTIVE_WINDOW_MS)
            .count()
    }

    /// Soft-destroy records whose last heartbeat fell out of the window long
    /// ago. Returns removed ids.
    pub fn sweep_stale(&self, now_ms: u64, grace_ms: u64) -> Vec<String> {
        let cutoff = AGENT_ACTIVE_WINDOW_MS + grace_ms;
        let stale: Vec<String> = self
            .agents
            .iter()
            .filter(|a| now_ms.saturating_sub(a.last_seen_ms) > cutoff)
            .map(|a| a.agent_id.clone())
            .collect();
        for id in &stale {
            self.agents.remove(id);
        }
        stale
    }

    /// Total records, live or not.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True when no agent is known.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{AgentMode, SandboxMode};

    fn record(agent_id: &str, last_seen_ms: u64) -> AgentRecord {
        AgentRecord {
            agent_id: agent_id.into(),
            os: "linux".into(),
            version: "1.0.0".into(),
            mode: AgentMode::SwarmOnly,
            local_model_provider: "ollama".into(),
            model_catalog: vec!["qwen2.5-coder".into()],
            active_model: None,
            sandbox_mode: SandboxMode::Docker,
            public_key_pem: None,
            x25519_public_key: None,
            max_concurrent_tasks: 1,
            power: None,
            owner_email: "ops@example.org".into(),
            last_seen_ms,
            connected_peers: vec![],
        }
    }

    #[test]
    fn active_window_boundary() {
        let dir = AgentDirectory::new();
        dir.install(record("w1", 1_000));
        assert!(dir.is_active("w1", 1_000 + AGENT_ACTIVE_WINDOW_MS));
        assert!(!dir.is_active("w1", 1_001 + AGENT_ACTIVE_WINDOW_MS));
    }

    #[test]
    fn heartbeat_restores_liveness() {
        let dir = AgentDirectory::new();
        dir.install(record("w1", 0));
        let later = AGENT_ACTIVE_WINDOW_MS * 2;
        assert!(!dir.is_active("w1", later));
        assert!(dir.heartbeat("w1", None, None, later));
        assert!(dir.is_active("w1", later));
    }

    #[test]
    fn sweep_removes_only_long_gone() {
        let dir = AgentDirectory::new();
        dir.install(record("gone", 0));
        dir.install(record("fresh", 500_000));
        let removed = dir.sweep_stale(600_000, 60_000);
        assert_eq!(removed, vec!["gone".to_string()]);
        assert_eq!(dir.len(), 1);
    }
}
