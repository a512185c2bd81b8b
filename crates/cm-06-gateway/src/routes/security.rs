//! Blacklist routes.

use crate::domain::error::ApiError;
use crate::domain::requests::BlacklistPostRequest;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cm_04_agent_registry::NewBlacklistEvent;
use serde_json::{json, Value};
use shared_types::MeshMessageType;

/// `GET /security/blacklist`
pub async fn blacklist_get(State(state): State<AppState>) -> Json<Value> {
    let now_ms = state.now_ms();
    Json(json!({
        "version": state.registry.blacklist().version(),
        "agents": state.registry.blacklist().active_agents(now_ms),
    }))
}

/// `POST /security/blacklist`
///
/// Appends to the local chain (machine reason codes require a valid
/// reporter signature) and gossips the new event to the mesh.
pub async fn blacklist_post(
    State(state): State<AppState>,
    Json(request): Json<BlacklistPostRequest>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    let record = state.registry.blacklist_agent(
        NewBlacklistEvent {
            agent_id: request.agent_id,
            reason_code: request.reason_code,
            reason: request.reason,
            evidence_hash_sha256: request.evidence_hash_sha256,
            reporter_id: request.reporter_id,
            reporter_signature: request.reporter_signature,
            reporter_public_key_pem: request.reporter_public_key_pem,
            expires_at_ms: request.expires_at_ms,
        },
        now_ms,
    )?;

    if let Ok(value) = serde_json::to_value(&record) {
        let mesh = state.mesh.clone();
        tokio::spawn(async move {
            mesh.broadcast(MeshMessageType::BlacklistUpdate, value, now_ms)
                .await;
        });
    }

    Ok(Json(json!({
        "ok": true,
        "eventId": record.event_id,
        "eventHash": record.event_hash,
        "version": state.registry.blacklist().version(),
    })))
}

/// `GET /security/blacklist/audit`
pub async fn blacklist_audit(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"events": state.registry.blacklist().audit()}))
}
