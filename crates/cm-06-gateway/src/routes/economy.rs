//! Economy routes: price epochs, payment intents, treasury, issuance.
//!
//! These compose on top of the queue+ledger core; credits minted by a
//! settled intent land in the earnings projection the submit gate reads.

use crate::domain::error::ApiError;
use crate::domain::requests::{ConfirmIntentRequest, CreateIntentRequest, PriceProposalRequest};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

/// `GET /economy/price-epochs/current`
pub async fn price_current(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"epoch": state.settlement.prices().current()}))
}

/// `POST /economy/price-epochs/propose`
pub async fn price_propose(
    State(state): State<AppState>,
    Json(request): Json<PriceProposalRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.credits_per_subtask == 0 {
        return Err(ApiError::validation("creditsPerSubtask must be positive"));
    }
    let epoch = state
        .settlement
        .prices()
        .propose(request.credits_per_subtask, state.now_ms());
    Ok(Json(json!({"ok": true, "epoch": epoch})))
}

/// `POST /economy/payments/intents`
pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.credits == 0 {
        return Err(ApiError::validation("credits must be positive"));
    }
    let intent = state.settlement.payments().create(
        &request.account_id,
        request.credits,
        state.config.payment_intent_ttl_ms,
        state.now_ms(),
    );
    Ok(Json(json!({"ok": true, "intent": intent})))
}

/// `GET /economy/payments/intents/:intent_id`
pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let intent = state.settlement.payments().get(&intent_id).ok_or_else(|| {
        ApiError::new(
            axum::http::StatusCode::NOT_FOUND,
            "intent_not_found",
            format!("intent {intent_id}"),
        )
    })?;
    Ok(Json(json!({"intent": intent})))
}

/// `POST /economy/payments/intents/:intent_id/confirm`
///
/// Mints credits at most once per `tx_ref`.
pub async fn confirm_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
    Json(request): Json<ConfirmIntentRequest>,
) -> Result<Json<Value>, ApiError> {
    let credits = state
        .settlement
        .payments()
        .confirm(&intent_id, &request.tx_ref, state.now_ms())?;

    let intent = state.settlement.payments().get(&intent_id);
    if let Some(intent) = &intent {
        state
            .chain
            .stats()
            .with_earnings_mut(|e| e.credit(&intent.account_id, credits));
        info!(intent_id, account_id = %intent.account_id, credits, "payment settled");
    }
    Ok(Json(json!({"ok": true, "creditsMinted": credits})))
}

/// `GET /economy/treasury`
pub async fn treasury(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"policy": state.settlement.prices().treasury()}))
}

/// `GET /economy/issuance/status`
pub async fn issuance_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "quorumRecords": state.settlement.quorum().len(),
        "anchors": state.settlement.anchors().all(),
    }))
}
