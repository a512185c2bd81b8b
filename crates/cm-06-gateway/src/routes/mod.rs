//! Route assembly.
//!
//! Two sub-routers: the open surface (`/register`, `/mesh/ws`) and
//! everything else behind the mesh-token guard. Tower layers apply the body
//! cap, per-route timeout, CORS, and tracing to the whole tree.

pub mod agent;
pub mod agent_mesh;
pub mod economy;
pub mod info;
pub mod ledger;
pub mod mesh;
pub mod orchestration;
pub mod security;
pub mod submit;

use crate::middleware::auth::mesh_token_guard;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the full coordinator router.
pub fn build_router(state: AppState) -> Router {
    let open = Router::new()
        .route("/register", post(agent::register))
        .route("/mesh/ws", get(crate::ws::mesh_ws));

    let protected = Router::new()
        // Agent-facing (signed-request verification happens in-handler).
        .route("/heartbeat", post(agent::heartbeat))
        .route("/pull", post(agent::pull))
        .route("/result", post(agent::result))
        .route("/agent/diagnostics", post(agent::diagnostics))
        // Submitter-facing.
        .route("/submit", post(submit::submit))
        // Mesh.
        .route("/identity", get(mesh::identity))
        .route("/mesh/peers", get(mesh::peers))
        .route("/mesh/register-peer", post(mesh::register_peer))
        .route("/mesh/ingest", post(mesh::ingest))
        // Ledgers.
        .route("/stats/ledger/head", get(ledger::stats_head))
        .route("/stats/ledger/range", get(ledger::stats_range))
        .route("/stats/ledger/ingest", post(ledger::stats_ingest))
        .route("/stats/anchors/anchor-latest", post(ledger::anchor_latest))
        .route("/stats/anchors/verify", get(ledger::anchor_verify))
        .route("/ledger/snapshot", get(ledger::snapshot))
        .route("/ledger/verify", get(ledger::verify))
        .route("/projections/node-status", get(ledger::node_status))
        .route("/projections/earnings", get(ledger::earnings))
        // Security.
        .route(
            "/security/blacklist",
            get(security::blacklist_get).post(security::blacklist_post),
        )
        .route("/security/blacklist/audit", get(security::blacklist_audit))
        // Info.
        .route("/capacity", get(info::capacity))
        .route("/status", get(info::status))
        .route("/features", get(info::features))
        .route("/models/available", get(info::models_available))
        // Agent mesh.
        .route("/agent-mesh/peers/:agent_id", get(agent_mesh::peers_for))
        .route("/agent-mesh/connect", post(agent_mesh::connect))
        .route("/agent-mesh/accept", post(agent_mesh::accept))
        .route("/agent-mesh/relay", post(agent_mesh::relay))
        .route("/agent-mesh/close", post(agent_mesh::close))
        .route("/agent-mesh/close-ack", post(agent_mesh::close_ack))
        .route("/agent-mesh/direct-work/offer", post(agent_mesh::dw_offer))
        .route("/agent-mesh/direct-work/accept", post(agent_mesh::dw_accept))
        .route("/agent-mesh/direct-work/result", post(agent_mesh::dw_result))
        .route("/agent-mesh/direct-work/audit", get(agent_mesh::dw_audit))
        .route("/agent-mesh/models/request", post(agent_mesh::model_request))
        .route(
            "/agent-mesh/models/request/:offer_id",
            get(agent_mesh::model_request_status),
        )
        // Orchestration.
        .route(
            "/orchestration/coordinator/ollama-install",
            post(orchestration::coordinator_install),
        )
        .route(
            "/orchestration/agents/:agent_id/ollama-install",
            post(orchestration::agent_install),
        )
        .route(
            "/orchestration/agents/:agent_id/status",
            post(orchestration::agent_status),
        )
        .route(
            "/orchestration/agents/:agent_id/ack",
            post(orchestration::agent_ack),
        )
        .route("/orchestration/rollouts", get(orchestration::rollouts))
        // Economy.
        .route("/economy/price-epochs/current", get(economy::price_current))
        .route("/economy/price-epochs/propose", post(economy::price_propose))
        .route("/economy/payments/intents", post(economy::create_intent))
        .route(
            "/economy/payments/intents/:intent_id",
            get(economy::get_intent),
        )
        .route(
            "/economy/payments/intents/:intent_id/confirm",
            post(economy::confirm_intent),
        )
        .route("/economy/treasury", get(economy::treasury))
        .route("/economy/issuance/status", get(economy::issuance_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            mesh_token_guard,
        ));

    open.merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_millis(
            state.config.request_timeout_ms,
        )))
        .layer(RequestBodyLimitLayer::new(state.config.body_limit_bytes))
        .with_state(state)
}
