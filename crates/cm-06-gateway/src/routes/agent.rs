//! Agent-facing routes: `/register`, `/heartbeat`, `/pull`, `/result`,
//! `/agent/diagnostics`.
//!
//! `/heartbeat`, `/pull`, and `/result` are signed routes: the handler reads
//! the raw body, verifies the five `x-*` headers, then parses. Loopback
//! bypasses the per-agent rate limit, never the signature.

use crate::domain::error::ApiError;
use crate::domain::requests::{
    AgentPolicyView, BlacklistDelta, DiagnosticsRequest, HeartbeatRequest, HeartbeatResponse,
    PullRequest, PullResponse, RegisterRequest, RegisterResponse, ResultRequest,
};
use crate::middleware::signed::verify_signed_request;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use cm_02_task_queue::AgentPolicy;
use cm_03_ordering_chain::TASK_REWARD_CREDITS;
use cm_04_agent_registry::{RegisterInput, RegistryError, RegistryService};
use shared_crypto::seal_for;
use shared_types::{
    ChainDraft, ChainEventType, ResultAnnouncePayload, SubtaskResult,
};
use std::net::SocketAddr;
use tracing::{debug, warn};

fn is_loopback(addr: Option<&ConnectInfo<SocketAddr>>) -> bool {
    addr.map(|a| a.0.ip().is_loopback()).unwrap_or(false)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::validation(e.to_string()))
}

fn check_rate(state: &AppState, agent_id: &str, loopback: bool) -> Result<(), ApiError> {
    if !loopback && !state.agent_rate.check(agent_id) {
        return Err(ApiError::rate_limited("agent_rate_limited"));
    }
    Ok(())
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let loopback = is_loopback(addr.as_ref());
    let now_ms = state.now_ms();

    let outcome = state
        .registry
        .register(
            RegisterInput {
                agent_id: request.agent_id.clone(),
                os: request.os,
                version: request.version,
                mode: request.mode,
                registration_token: request.registration_token,
                owner_email: request.owner_email,
                sandbox_mode: request.sandbox_mode,
                max_concurrent_tasks: request.max_concurrent_tasks,
                local_model_provider: request.local_model_provider,
                model_catalog: request.model_catalog,
                active_model: request.active_model,
                public_key_pem: request.public_key_pem,
                x25519_public_key: request.x25519_public_key,
            },
            loopback,
            now_ms,
        )
        .await?;

    state.queue.register_agent(
        &outcome.record.agent_id,
        AgentPolicy {
            max_concurrent_tasks: outcome.record.max_concurrent_tasks,
            sandbox_mode: outcome.record.sandbox_mode,
        },
        outcome.record.model_catalog.clone(),
    );
    state.agent_rate.reset(&outcome.record.agent_id);

    state.chain.append(
        ChainDraft {
            event_type: ChainEventType::NodeApproval,
            task_id: "-".into(),
            subtask_id: None,
            actor_id: outcome.record.agent_id.clone(),
            checkpoint_height: None,
            checkpoint_hash: None,
            payload_json: Some(
                serde_json::json!({"ownerEmail": outcome.record.owner_email}).to_string(),
            ),
        },
        now_ms,
    )?;

    Ok(Json(RegisterResponse {
        accepted: true,
        policy: AgentPolicyView {
            max_concurrent_tasks: outcome.record.max_concurrent_tasks,
        },
        mode: outcome.record.mode,
        mesh_token: (!state.config.mesh_token.is_empty())
            .then(|| state.config.mesh_token.clone()),
    }))
}

/// `POST /heartbeat` (signed)
pub async fn heartbeat(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let request: HeartbeatRequest = parse_body(&body)?;
    let loopback = is_loopback(addr.as_ref());
    check_rate(&state, &request.agent_id, loopback)?;
    verify_signed_request(&state, "POST", "/heartbeat", &headers, &body, &request.agent_id)?;

    let now_ms = state.now_ms();
    match state.registry.heartbeat(
        &request.agent_id,
        request.power,
        request.active_model.clone(),
        now_ms,
    ) {
        Ok(()) => {}
        Err(RegistryError::AgentBlacklisted) => {
            return Ok(Json(HeartbeatResponse {
                ok: false,
                blacklisted: Some(true),
                policy: None,
                orchestration: None,
                tunnel_invites: vec![],
                tunnel_close_notices: vec![],
                tunnel_frames: vec![],
                direct_work_offers: vec![],
                blacklist: BlacklistDelta {
                    version: state.registry.blacklist().version(),
                    agents: state.registry.blacklist().active_agents(now_ms),
                },
            }));
        }
        Err(error) => return Err(error.into()),
    }
    // The registry accepted the heartbeat; a queue miss here means the
    // worker record was swept and will be reinstalled on re-register.
    if let Err(error) = state.queue.heartbeat(&request.agent_id) {
        warn!(agent_id = %request.agent_id, %error, "queue heartbeat failed");
    }

    let policy = state.registry.pull_decision(&request.agent_id, now_ms).ok();
    Ok(Json(HeartbeatResponse {
        ok: true,
        blacklisted: None,
        policy,
        orchestration: state.rollouts.pending_command(&request.agent_id),
        tunnel_invites: state.tunnels.invites_for(&request.agent_id),
        tunnel_close_notices: state.tunnels.close_notices_for(&request.agent_id),
        tunnel_frames: state.tunnels.drain_frames_for(&request.agent_id),
        direct_work_offers: state.direct_work.offers_for(&request.agent_id),
        blacklist: BlacklistDelta {
            version: state.registry.blacklist().version(),
            agents: state.registry.blacklist().active_agents(now_ms),
        },
    }))
}

/// `POST /pull` (signed)
pub async fn pull(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PullResponse>, ApiError> {
    let request: PullRequest = parse_body(&body)?;
    let loopback = is_loopback(addr.as_ref());
    check_rate(&state, &request.agent_id, loopback)?;
    verify_signed_request(&state, "POST", "/pull", &headers, &body, &request.agent_id)?;

    let now_ms = state.now_ms();
    let decision = state.registry.pull_decision(&request.agent_id, now_ms)?;
    if !decision.allow_coordinator_tasks {
        return Ok(Json(PullResponse {
            power_deferred: Some(true),
            blocked: Some(true),
            reason: Some(decision.reason),
            ..PullResponse::default()
        }));
    }
    if decision.defer_ms > 0 {
        return Ok(Json(PullResponse {
            power_deferred: Some(true),
            defer_ms: Some(decision.defer_ms),
            reason: Some(decision.reason),
            ..PullResponse::default()
        }));
    }

    let agent = state
        .registry
        .directory()
        .get(&request.agent_id)
        .ok_or_else(|| ApiError::agent_not_found(&request.agent_id))?;
    let preferred = request
        .preferred_model
        .as_deref()
        .or(agent.active_model.as_deref());

    let Some(mut subtask) = state.queue.claim(&request.agent_id, preferred) else {
        return Ok(Json(PullResponse::default()));
    };

    if !RegistryService::sandbox_satisfied(&subtask, &agent) {
        state.queue.requeue(&subtask.id)?;
        debug!(agent_id = %request.agent_id, subtask_id = %subtask.id, "sandbox miss, requeued");
        return Ok(Json(PullResponse {
            sandbox_required: Some(true),
            ..PullResponse::default()
        }));
    }

    // Battery-restricted agents only take single-step work.
    if decision.allow_small_tasks_only && subtask.kind == shared_types::SubtaskKind::MicroLoop {
        state.queue.requeue(&subtask.id)?;
        return Ok(Json(PullResponse {
            power_deferred: Some(true),
            reason: Some(decision.reason),
            ..PullResponse::default()
        }));
    }

    state.chain.append(
        ChainDraft {
            event_type: ChainEventType::TaskClaim,
            task_id: subtask.task_id.clone(),
            subtask_id: Some(subtask.id.clone()),
            actor_id: request.agent_id.clone(),
            checkpoint_height: None,
            checkpoint_hash: None,
            payload_json: None,
        },
        now_ms,
    )?;
    state.registry.record_pull(&request.agent_id, now_ms);

    // Encrypt the payload for agents that registered an envelope key.
    let envelope = match agent.x25519_public_key.as_deref() {
        Some(recipient) => match seal_for(recipient, subtask.input.as_bytes()) {
            Ok((sealed, key)) => {
                state.envelope_keys.insert(&subtask.id, key, now_ms);
                subtask.input = String::new();
                Some(sealed)
            }
            Err(error) => {
                warn!(%error, subtask_id = %subtask.id, "envelope seal failed, sending plaintext");
                None
            }
        },
        None => None,
    };

    Ok(Json(PullResponse {
        subtask: Some(subtask),
        envelope,
        ..PullResponse::default()
    }))
}

/// `POST /result` (signed; output may arrive encrypted)
pub async fn result(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: ResultRequest = parse_body(&body)?;
    let loopback = is_loopback(addr.as_ref());

    // The signing identity is the agent that claimed the subtask.
    let signed_agent = headers
        .get(shared_types::security::headers::AGENT_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    check_rate(&state, &signed_agent, loopback)?;
    verify_signed_request(&state, "POST", "/result", &headers, &body, &signed_agent)?;

    let now_ms = state.now_ms();
    let output = match &request.envelope {
        Some(sealed) => {
            let key = state
                .envelope_keys
                .get(&request.subtask_id, now_ms)
                .map_err(|e| ApiError::validation(e.to_string()))?;
            let plaintext = shared_crypto::open_sealed(sealed, &key).map_err(|e| {
                ApiError::new(
                    axum::http::StatusCode::BAD_REQUEST,
                    "envelope_decrypt_failed",
                    e.to_string(),
                )
            })?;
            String::from_utf8(plaintext)
                .map_err(|_| ApiError::validation("decrypted output is not UTF-8"))?
        }
        None => request.output.clone(),
    };

    let result = SubtaskResult {
        subtask_id: request.subtask_id.clone(),
        task_id: request.task_id.clone(),
        ok: request.ok,
        output: output.clone(),
        duration_ms: request.duration_ms,
        error: request.error.clone(),
    };
    let outcome = state.queue.complete(&result)?;
    if !outcome.newly_completed {
        return Ok(Json(serde_json::json!({"ok": true, "duplicate": true})));
    }
    state.envelope_keys.remove(&request.subtask_id);

    state.chain.append(
        ChainDraft {
            event_type: ChainEventType::TaskComplete,
            task_id: request.task_id.clone(),
            subtask_id: Some(request.subtask_id.clone()),
            actor_id: signed_agent.clone(),
            checkpoint_height: None,
            checkpoint_hash: None,
            payload_json: Some(
                serde_json::json!({"ok": request.ok, "durationMs": request.duration_ms})
                    .to_string(),
            ),
        },
        now_ms,
    )?;

    if let Some(agent) = state.registry.directory().get(&signed_agent) {
        state.chain.append(
            ChainDraft {
                event_type: ChainEventType::EarningsAccrual,
                task_id: request.task_id.clone(),
                subtask_id: Some(request.subtask_id.clone()),
                actor_id: signed_agent.clone(),
                checkpoint_height: None,
                checkpoint_hash: None,
                payload_json: Some(
                    serde_json::json!({
                        "accountId": agent.owner_email,
                        "credits": TASK_REWARD_CREDITS,
                    })
                    .to_string(),
                ),
            },
            now_ms,
        )?;
    }

    let mesh = state.mesh.clone();
    let announce = ResultAnnouncePayload {
        subtask_id: request.subtask_id,
        task_id: request.task_id,
        ok: request.ok,
        output: Some(output),
        duration_ms: Some(request.duration_ms),
    };
    tokio::spawn(async move {
        mesh.announce_result(announce, now_ms).await;
    });

    Ok(Json(serde_json::json!({"ok": true})))
}

/// `POST /agent/diagnostics`
///
/// Always 200: diagnostics persistence degrades gracefully.
pub async fn diagnostics(
    State(state): State<AppState>,
    Json(request): Json<DiagnosticsRequest>,
) -> Json<serde_json::Value> {
    let mut log = state.diagnostics.lock();
    if log.len() >= 1_000 {
        log.remove(0);
    }
    debug!(agent_id = %request.agent_id, level = %request.level, "agent diagnostics");
    log.push(request);
    Json(serde_json::json!({"ok": true}))
}
