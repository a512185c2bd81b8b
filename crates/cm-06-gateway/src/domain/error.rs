//! Gateway error taxonomy.
//!
//! Every internal error surfaces as `{error: <code>, message}` with a
//! numeric status: 400 validation, 401 auth, 403 forbidden, 404 not-found,
//! 409 conflict, 413 payload, 429 rate, 500 internal, 502 upstream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cm_01_peer_mesh::MeshError;
use cm_02_task_queue::QueueError;
use cm_03_ordering_chain::{ChainVerifyError, stats::IngestError};
use cm_04_agent_registry::RegistryError;
use cm_05_settlement::SettlementError;
use serde_json::json;

/// A request-visible error.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    /// Build an error.
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 with a field path, for schema failures.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    /// 401 `mesh_unauthorized`.
    pub fn mesh_unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "mesh_unauthorized",
            "missing or invalid mesh token",
        )
    }

    /// 401 `signature_invalid`.
    pub fn signature_invalid() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "signature_invalid",
            "request signature did not verify",
        )
    }

    /// 401 `replay_attempt`.
    pub fn replay_attempt(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "replay_attempt", message)
    }

    /// 401 `agent_id_mismatch`.
    pub fn agent_id_mismatch() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "agent_id_mismatch",
            "signed agent id does not match the request body",
        )
    }

    /// 404 `agent_not_found`.
    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "agent_not_found",
            format!("agent {agent_id} is not registered"),
        )
    }

    /// 429 with a specific rate code.
    pub fn rate_limited(code: &'static str) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, code, "rate limit exceeded")
    }

    /// 500 internal.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// 502 `inference_service_unavailable`.
    pub fn inference_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "inference_service_unavailable",
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match &error {
            RegistryError::NodeNotActivated => {
                Self::new(StatusCode::FORBIDDEN, "node_not_activated", error.to_string())
            }
            RegistryError::AgentBlacklisted => {
                Self::new(StatusCode::FORBIDDEN, "agent_blacklisted", error.to_string())
            }
            RegistryError::AgentNotFound(id) => Self::agent_not_found(id),
            RegistryError::PortalUnreachable => Self::new(
                StatusCode::BAD_GATEWAY,
                "portal_validation_unreachable",
                error.to_string(),
            ),
            RegistryError::InvalidBlacklistPayload(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_blacklist_payload",
                error.to_string(),
            ),
            RegistryError::ReporterSignatureInvalid => Self::new(
                StatusCode::BAD_REQUEST,
                "reporter_signature_invalid_for_reason_code",
                error.to_string(),
            ),
            RegistryError::ChainMismatch => Self::new(
                StatusCode::CONFLICT,
                "invalid_blacklist_payload",
                error.to_string(),
            ),
            RegistryError::UnknownCoordinator(_) => {
                Self::new(StatusCode::NOT_FOUND, "peer_unknown", error.to_string())
            }
            RegistryError::CoordinatorSignatureInvalid => Self::signature_invalid(),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(error: QueueError) -> Self {
        match &error {
            QueueError::SubtaskNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "subtask_not_found", error.to_string())
            }
            QueueError::AgentNotFound(id) => Self::agent_not_found(id),
            QueueError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "invalid_transition", error.to_string())
            }
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(error: SettlementError) -> Self {
        match &error {
            SettlementError::CoordinatorNotApproved(_) => Self::new(
                StatusCode::FORBIDDEN,
                "coordinator_not_approved",
                error.to_string(),
            ),
            SettlementError::InvalidQuorumThreshold => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_quorum_threshold",
                error.to_string(),
            ),
            SettlementError::DuplicateTxRef => Self::new(
                StatusCode::CONFLICT,
                "duplicate_tx_ref_rejected",
                error.to_string(),
            ),
            SettlementError::IntentNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "intent_not_found", error.to_string())
            }
            SettlementError::IntentExpired(_) => {
                Self::new(StatusCode::CONFLICT, "intent_expired", error.to_string())
            }
            SettlementError::EpochNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "epoch_not_found", error.to_string())
            }
            SettlementError::RecordBuild(_) => Self::internal(error.to_string()),
            SettlementError::SignatureInvalid => Self::signature_invalid(),
        }
    }
}

impl From<MeshError> for ApiError {
    fn from(error: MeshError) -> Self {
        match &error {
            MeshError::Expired => {
                Self::new(StatusCode::BAD_REQUEST, "mesh_message_expired", error.to_string())
            }
            MeshError::PeerUnknown(_) => {
                Self::new(StatusCode::NOT_FOUND, "peer_unknown", error.to_string())
            }
            MeshError::SignatureInvalid => Self::signature_invalid(),
            MeshError::PeerRateLimited => Self::rate_limited("peer_rate_limited"),
            MeshError::InvalidPayload(_) => Self::validation(error.to_string()),
            MeshError::InvalidTaskOffer(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid_task_offer_payload",
                error.to_string(),
            ),
        }
    }
}

impl From<ChainVerifyError> for ApiError {
    fn from(error: ChainVerifyError) -> Self {
        // Chain append failures are fatal for the operation: the sequence
        // invariant is worth a 500.
        Self::internal(error.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match &error {
            IngestError::UnknownCoordinator(_) => {
                Self::new(StatusCode::NOT_FOUND, "peer_unknown", error.to_string())
            }
            IngestError::Verify(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_signature", error.to_string())
            }
        }
    }
}
