//! Mesh routes: `/identity`, `/mesh/peers`, `/mesh/register-peer`,
//! `/mesh/ingest`.

use crate::domain::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cm_01_peer_mesh::IngestOutcome;
use serde_json::{json, Value};
use shared_types::{MeshMessage, PeerIdentity};

/// `GET /identity`
pub async fn identity(State(state): State<AppState>) -> Json<PeerIdentity> {
    Json(state.mesh.identity().clone())
}

/// `GET /mesh/peers`
pub async fn peers(State(state): State<AppState>) -> Json<Value> {
    let peers: Vec<Value> = state
        .mesh
        .table()
        .all()
        .into_iter()
        .map(|p| {
            json!({
                "peerId": p.identity.peer_id,
                "url": p.reachable_url,
                "role": p.identity.role,
                "networkMode": p.identity.network_mode,
                "score": p.score,
                "lastSeenMs": p.last_seen_ms,
            })
        })
        .collect();
    Json(json!({"peers": peers}))
}

/// `POST /mesh/register-peer`
pub async fn register_peer(
    State(state): State<AppState>,
    Json(identity): Json<PeerIdentity>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    let url = identity.coordinator_url.clone();
    if !state.mesh.table().add_peer(identity, &url, now_ms) {
        return Err(ApiError::new(
            axum::http::StatusCode::CONFLICT,
            "peer_key_conflict",
            "peer id already registered with a different key",
        ));
    }
    Ok(Json(json!({"ok": true})))
}

/// `POST /mesh/ingest`
pub async fn ingest(
    State(state): State<AppState>,
    Json(message): Json<MeshMessage>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    match state.mesh.handle_message(message, now_ms).await? {
        IngestOutcome::Handled => Ok(Json(json!({"ok": true}))),
        IngestOutcome::Ignored(reason) => Ok(Json(json!({"ok": true, "ignored": reason}))),
    }
}
