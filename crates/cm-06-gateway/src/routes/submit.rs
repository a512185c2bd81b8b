//! `POST /submit`: decompose a task and feed the queue + mesh.

use crate::domain::error::ApiError;
use crate::domain::requests::{SubmitRequest, SubmitResponse};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cm_02_task_queue::EnqueueOpts;
use shared_types::{
    ChainDraft, ChainEventType, MeshMessageType, TaskOfferPayload, TaskSubmission,
};
use tracing::info;

/// `POST /submit`
///
/// Flow: economy gate → inference decomposition (502 on failure, nothing
/// enqueued) → one `task_enqueue` chain record for the task → batch intake
/// (dependencies held, cycles enqueued) → `task_offer` gossip per enqueued
/// subtask.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let submission = TaskSubmission {
        task_id: request.task_id.clone(),
        prompt: request.prompt,
        language: request.language,
        snapshot_ref: request.snapshot_ref,
        project_meta: request.project_meta,
        account_id: request.account_id.clone(),
    };

    let subtasks = state
        .inference
        .decompose(&submission)
        .await
        .map_err(ApiError::inference_unavailable)?;
    let subtask_ids: Vec<String> = subtasks.iter().map(|s| s.id.clone()).collect();

    // Submitters spend credits; agents contribute first, then submit.
    if let Some(account_id) = &request.account_id {
        let price = state.settlement.prices().current().credits_per_subtask;
        let cost = price * subtasks.len() as u64;
        let stats = state.chain.stats();
        let known = stats.with_earnings(|e| e.get(account_id));
        match known {
            None => {
                return Err(ApiError::new(
                    StatusCode::FORBIDDEN,
                    "contribute_first_required",
                    "account has no contribution history on this mesh",
                ))
            }
            Some(earnings) if earnings.credits < cost => {
                return Err(ApiError::new(
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_credits",
                    format!("need {cost} credits, account holds {}", earnings.credits),
                ))
            }
            Some(_) => {
                stats.with_earnings_mut(|e| e.debit(account_id, cost));
            }
        }
    }

    let now_ms = state.now_ms();
    state.chain.append(
        ChainDraft {
            event_type: ChainEventType::TaskEnqueue,
            task_id: request.task_id.clone(),
            subtask_id: None,
            actor_id: request
                .account_id
                .clone()
                .unwrap_or_else(|| "submitter".into()),
            checkpoint_height: None,
            checkpoint_hash: None,
            payload_json: Some(
                serde_json::json!({"subtaskCount": subtasks.len()}).to_string(),
            ),
        },
        now_ms,
    )?;

    let summary = state.queue.intake_batch(
        subtasks.clone(),
        EnqueueOpts {
            claim_delay_ms: state.config.offer_claim_delay_ms,
        },
    );
    info!(
        task_id = %request.task_id,
        enqueued = summary.enqueued.len(),
        held = summary.held.len(),
        "task submitted"
    );

    // Offer the enqueued subtasks to the mesh so any coordinator can run
    // them. Fire-and-forget.
    let identity = state.mesh.identity().clone();
    for subtask in subtasks
        .into_iter()
        .filter(|s| summary.enqueued.contains(&s.id))
    {
        let offer = TaskOfferPayload {
            subtask,
            origin_coordinator_id: identity.peer_id.clone(),
            origin_coordinator_url: identity.coordinator_url.clone(),
        };
        if let Ok(value) = serde_json::to_value(&offer) {
            let mesh = state.mesh.clone();
            tokio::spawn(async move {
                mesh.broadcast(MeshMessageType::TaskOffer, value, now_ms).await;
            });
        }
    }

    Ok(Json(SubmitResponse {
        task_id: request.task_id,
        subtasks: subtask_ids,
    }))
}
