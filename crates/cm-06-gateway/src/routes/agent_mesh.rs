//! Agent-mesh routes: tunnels, direct work, and model requests.

use crate::domain::error::ApiError;
use crate::domain::requests::{
    DirectWorkOfferRequest, DirectWorkRefRequest, ModelRequestBody, TunnelConnectRequest,
    TunnelRefRequest, TunnelRelayRequest,
};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// `GET /agent-mesh/peers/:agent_id`: live agents visible to one agent.
pub async fn peers_for(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    if state.registry.directory().get(&agent_id).is_none() {
        return Err(ApiError::agent_not_found(&agent_id));
    }
    let peers: Vec<Value> = state
        .registry
        .directory()
        .live_agents(now_ms)
        .into_iter()
        .filter(|a| a.agent_id != agent_id)
        .map(|a| {
            json!({
                "agentId": a.agent_id,
                "models": a.model_catalog,
                "sandboxMode": a.sandbox_mode,
                "lastSeenMs": a.last_seen_ms,
            })
        })
        .collect();
    Ok(Json(json!({"peers": peers})))
}

/// `POST /agent-mesh/connect`
pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<TunnelConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    if state
        .registry
        .directory()
        .get(&request.to_agent_id)
        .is_none()
    {
        return Err(ApiError::agent_not_found(&request.to_agent_id));
    }
    let tunnel_id = state
        .tunnels
        .connect(&request.from_agent_id, &request.to_agent_id, now_ms);
    Ok(Json(json!({"ok": true, "tunnelId": tunnel_id})))
}

/// `POST /agent-mesh/accept`
pub async fn accept(
    State(state): State<AppState>,
    Json(request): Json<TunnelRefRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .tunnels
        .accept(&request.tunnel_id, &request.agent_id, state.now_ms())?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /agent-mesh/relay`
pub async fn relay(
    State(state): State<AppState>,
    Json(request): Json<TunnelRelayRequest>,
) -> Result<Json<Value>, ApiError> {
    state.tunnels.relay(
        &request.tunnel_id,
        &request.from_agent_id,
        &request.payload,
        state.config.relay_rate_limit_per_10s,
        state.config.tunnel_max_relays_per_min,
        state.config.relay_max_payload_bytes,
        state.now_ms(),
    )?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /agent-mesh/close`
pub async fn close(
    State(state): State<AppState>,
    Json(request): Json<TunnelRefRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .tunnels
        .close(&request.tunnel_id, &request.agent_id, state.now_ms())?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /agent-mesh/close-ack`
pub async fn close_ack(
    State(state): State<AppState>,
    Json(request): Json<TunnelRefRequest>,
) -> Result<Json<Value>, ApiError> {
    state.tunnels.close_ack(&request.tunnel_id, &request.agent_id)?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /agent-mesh/direct-work/offer`
pub async fn dw_offer(
    State(state): State<AppState>,
    Json(request): Json<DirectWorkOfferRequest>,
) -> Result<Json<Value>, ApiError> {
    let offer = state.direct_work.offer(
        "work",
        &request.from_agent_id,
        &request.to_agent_id,
        request.payload,
        state.config.direct_work_offers_per_10s,
        state.now_ms(),
    )?;
    Ok(Json(json!({"ok": true, "offerId": offer.offer_id})))
}

/// `POST /agent-mesh/direct-work/accept`
pub async fn dw_accept(
    State(state): State<AppState>,
    Json(request): Json<DirectWorkRefRequest>,
) -> Result<Json<Value>, ApiError> {
    state.direct_work.accept(&request.offer_id, &request.agent_id)?;
    Ok(Json(json!({"ok": true})))
}

/// `POST /agent-mesh/direct-work/result`
pub async fn dw_result(
    State(state): State<AppState>,
    Json(request): Json<DirectWorkRefRequest>,
) -> Result<Json<Value>, ApiError> {
    state.direct_work.complete(
        &request.offer_id,
        &request.agent_id,
        request.output.unwrap_or(Value::Null),
    )?;
    Ok(Json(json!({"ok": true})))
}

/// `GET /agent-mesh/direct-work/audit`
pub async fn dw_audit(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"offers": state.direct_work.audit()}))
}

/// `POST /agent-mesh/models/request`
///
/// Matches the request to a live agent advertising the model and posts a
/// `model_fetch` offer to it.
pub async fn model_request(
    State(state): State<AppState>,
    Json(request): Json<ModelRequestBody>,
) -> Result<Json<Value>, ApiError> {
    let now_ms = state.now_ms();
    let provider = state
        .registry
        .directory()
        .live_agents(now_ms)
        .into_iter()
        .find(|a| a.agent_id != request.requester_id && a.model_catalog.contains(&request.model))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "offer_not_available",
                format!("no live agent advertises {}", request.model),
            )
        })?;

    let offer = state.direct_work.offer(
        "model_fetch",
        &request.requester_id,
        &provider.agent_id,
        json!({"model": request.model}),
        state.config.direct_work_offers_per_10s,
        now_ms,
    )?;
    Ok(Json(json!({
        "ok": true,
        "offerId": offer.offer_id,
        "providerAgentId": provider.agent_id,
    })))
}

/// `GET /agent-mesh/models/request/:offer_id`
pub async fn model_request_status(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let offer = state.direct_work.get(&offer_id).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "offer_not_available",
            format!("offer {offer_id}"),
        )
    })?;
    Ok(Json(json!({"offer": offer})))
}
