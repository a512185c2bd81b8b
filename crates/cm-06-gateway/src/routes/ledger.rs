//! Ledger routes: stats replication, chain audit, anchors, and projections.

use crate::domain::error::ApiError;
use crate::domain::requests::StatsIngestRequest;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use cm_03_ordering_chain::stats::checkpoint;
use serde::Deserialize;
use serde_json::{json, Value};

/// `GET /stats/ledger/head`
pub async fn stats_head(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"head": state.chain.stats().head()}))
}

/// Query for `GET /stats/ledger/range`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    #[serde(default)]
    pub since_issued_at_ms: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    500
}

/// `GET /stats/ledger/range`
pub async fn stats_range(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Json<Value> {
    let records = state
        .chain
        .stats()
        .range(query.since_issued_at_ms, query.limit.min(2_000));
    Json(json!({"records": records}))
}

/// `POST /stats/ledger/ingest`
pub async fn stats_ingest(
    State(state): State<AppState>,
    Json(request): Json<StatsIngestRequest>,
) -> Result<Json<Value>, ApiError> {
    let accepted = state
        .chain
        .stats()
        .ingest(&request.records, state.key_directory.as_ref())?;
    Ok(Json(json!({"ok": true, "accepted": accepted})))
}

/// `POST /stats/anchors/anchor-latest`
pub async fn anchor_latest(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let Some((checkpoint_hash, height)) = checkpoint::current_candidate(state.chain.stats())
    else {
        return Ok(Json(json!({"ok": false, "reason": "empty stats ledger"})));
    };
    let anchor = state
        .settlement
        .anchor_checkpoint("stats", &checkpoint_hash)
        .await;
    Ok(Json(json!({
        "ok": anchor.is_some(),
        "checkpointHash": checkpoint_hash,
        "checkpointHeight": height,
        "anchor": anchor,
    })))
}

/// Query for `GET /stats/anchors/verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorVerifyQuery {
    pub checkpoint_hash: String,
}

/// `GET /stats/anchors/verify`
pub async fn anchor_verify(
    State(state): State<AppState>,
    Query(query): Query<AnchorVerifyQuery>,
) -> Json<Value> {
    match state
        .settlement
        .anchors()
        .find_by_checkpoint(&query.checkpoint_hash)
    {
        Some(anchor) => Json(json!({"found": true, "anchor": anchor})),
        None => Json(json!({"found": false})),
    }
}

/// `GET /ledger/snapshot`
pub async fn snapshot(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"records": state.chain.snapshot()}))
}

/// `GET /ledger/verify`
pub async fn verify(State(state): State<AppState>) -> Json<Value> {
    match state.chain.verify_own_chain() {
        Ok(()) => Json(json!({"ok": true, "length": state.chain.len()})),
        Err(error) => Json(json!({"ok": false, "error": error.to_string()})),
    }
}

/// `GET /projections/node-status` (mesh or portal token)
pub async fn node_status(State(state): State<AppState>) -> Json<Value> {
    let nodes = state.chain.stats().with_node_status(|p| p.all());
    Json(json!({"nodes": nodes}))
}

/// `GET /projections/earnings` (mesh or portal token)
pub async fn earnings(State(state): State<AppState>) -> Json<Value> {
    let accounts = state.chain.stats().with_earnings(|p| p.all());
    Json(json!({"accounts": accounts}))
}
