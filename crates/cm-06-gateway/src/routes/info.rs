//! Capacity, status, features, and model availability.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// `GET /capacity`
pub async fn capacity(State(state): State<AppState>) -> Json<Value> {
    let now_ms = state.now_ms();
    let live = state.registry.directory().live_agents(now_ms);
    let total_concurrency: u32 = live.iter().map(|a| a.max_concurrent_tasks).sum();
    Json(json!({
        "liveAgents": live.len(),
        "totalMaxConcurrent": total_concurrency,
        "queued": state.queue.queued_len(),
        "held": state.queue.held_len(),
        "peerSummaries": state.mesh.capability_summaries(),
    }))
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let now_ms = state.now_ms();
    Json(json!({
        "coordinatorId": state.mesh.identity().peer_id,
        "url": state.mesh.identity().coordinator_url,
        "uptimeMs": now_ms.saturating_sub(state.started_at_ms),
        "peers": state.mesh.table().len(),
        "agents": state.registry.directory().len(),
        "chainLength": state.chain.len(),
        "statsLength": state.chain.stats().len(),
        "tunnels": state.tunnels.len(),
    }))
}

/// `GET /features`
pub async fn features(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "gossip": true,
        "taskEnvelopes": true,
        "directWork": true,
        "tunnels": true,
        "orchestration": true,
        "economy": true,
        "meshTokenRequired": !state.config.mesh_token.is_empty(),
    }))
}

/// `GET /models/available`
pub async fn models_available(State(state): State<AppState>) -> Json<Value> {
    let now_ms = state.now_ms();
    let mut models: BTreeSet<String> = BTreeSet::new();
    for agent in state.registry.directory().live_agents(now_ms) {
        models.extend(agent.model_catalog.iter().cloned());
    }
    // Peer coordinators advertise theirs via capability summaries.
    for summary in state.mesh.capability_summaries() {
        models.extend(summary.models.iter().cloned());
    }
    Json(json!({"models": models.into_iter().collect::<Vec<_>>()}))
}
