//! Orchestration routes: Ollama install rollouts.

use crate::domain::error::ApiError;
use crate::domain::requests::{RolloutAckRequest, RolloutStatusRequest};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// `POST /orchestration/coordinator/ollama-install`
///
/// Records the coordinator-level install intent; the runtime's own model
/// provider handles the actual install.
pub async fn coordinator_install(State(state): State<AppState>) -> Json<Value> {
    let rollout = state
        .rollouts
        .create("_coordinator", "ollama-install", state.now_ms());
    Json(json!({"ok": true, "rolloutId": rollout.rollout_id}))
}

/// `POST /orchestration/agents/:agent_id/ollama-install`
pub async fn agent_install(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    let agent = state
        .registry
        .directory()
        .get(&agent_id)
        .ok_or_else(|| ApiError::agent_not_found(&agent_id))?;

    // Commands only go to agents seen inside the online window; anything
    // older would sit undelivered indefinitely.
    if now_ms.saturating_sub(agent.last_seen_ms) > state.config.orchestration_online_window_ms {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "orchestration_not_found",
            format!("agent {agent_id} is outside the online window"),
        ));
    }

    let rollout = state.rollouts.create(&agent_id, "ollama-install", now_ms);
    Ok(Json(json!({"ok": true, "rolloutId": rollout.rollout_id})))
}

/// `POST /orchestration/agents/:agent_id/status`
pub async fn agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<RolloutStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    state.rollouts.report(
        &agent_id,
        &request.rollout_id,
        &request.status,
        request.detail,
        state.now_ms(),
    )?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /orchestration/agents/:agent_id/ack`
pub async fn agent_ack(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<RolloutAckRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .rollouts
        .ack(&agent_id, &request.rollout_id, state.now_ms())?;
    Ok(Json(json!({"ok": true})))
}

/// `GET /orchestration/rollouts`
pub async fn rollouts(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"rollouts": state.rollouts.all()}))
}
