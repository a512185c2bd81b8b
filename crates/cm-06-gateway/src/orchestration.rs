//! # Orchestration Rollouts
//!
//! Coordinator-initiated maintenance on agents, currently Ollama installs.
//! A rollout is created per agent, delivered as the `orchestration` field of
//! the next heartbeat, acknowledged, and then driven to a terminal status by
//! the agent's reports.

use crate::domain::error::ApiError;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};

/// One rollout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    pub rollout_id: String,
    pub agent_id: String,
    pub command: String,
    pub status: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Rollouts by agent. One in-flight rollout per agent at a time.
#[derive(Default)]
pub struct RolloutStore {
    by_agent: DashMap<String, Rollout>,
}

impl RolloutStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rollout for an agent.
    pub fn create(&self, agent_id: &str, command: &str, now_ms: u64) -> Rollout {
        let rollout = Rollout {
            rollout_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            command: command.to_string(),
            status: "pending".into(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            detail: None,
        };
        self.by_agent.insert(agent_id.to_string(), rollout.clone());
        rollout
    }

    /// The undelivered command for an agent, as a heartbeat payload.
    pub fn pending_command(&self, agent_id: &str) -> Option<Value> {
        self.by_agent.get(agent_id).and_then(|r| {
            if r.status == "pending" {
                Some(json!({
                    "rolloutId": r.rollout_id,
                    "command": r.command,
                }))
            } else {
                None
            }
        })
    }

    /// Agent acknowledged receipt.
    pub fn ack(&self, agent_id: &str, rollout_id: &str, now_ms: u64) -> Result<(), ApiError> {
        self.update(agent_id, rollout_id, "acked", None, now_ms)
    }

    /// Agent reported progress or a terminal status.
    pub fn report(
        &self,
        agent_id: &str,
        rollout_id: &str,
        status: &str,
        detail: Option<String>,
        now_ms: u64,
    ) -> Result<(), ApiError> {
        self.update(agent_id, rollout_id, status, detail, now_ms)
    }

    fn update(
        &self,
        agent_id: &str,
        rollout_id: &str,
        status: &str,
        detail: Option<String>,
        now_ms: u64,
    ) -> Result<(), ApiError> {
        let mut rollout = self.by_agent.get_mut(agent_id).ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "orchestration_not_found",
                format!("no rollout for agent {agent_id}"),
            )
        })?;
        if rollout.rollout_id != rollout_id {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "orchestration_not_found",
                format!("rollout {rollout_id} is not current for {agent_id}"),
            ));
        }
        rollout.status = status.to_string();
        rollout.detail = detail;
        rollout.updated_at_ms = now_ms;
        Ok(())
    }

    /// All rollouts.
    pub fn all(&self) -> Vec<Rollout> {
        self.by_agent.iter().map(|r| r.clone()).collect()
    }
}
