//! # Direct Work Offers
//!
//! Agent-to-agent work that skips the queue: one agent offers a payload to a
//! specific peer, the peer accepts, runs it, and posts the result. Model
//! download requests ride the same board as `model_fetch` offers addressed
//! to an agent that advertises the model.

use crate::domain::error::ApiError;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};

/// Offer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Offered,
    Accepted,
    Completed,
}

/// One direct-work offer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectWorkOffer {
    pub offer_id: String,
    pub kind: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub payload: Value,
    pub status: OfferStatus,
    pub created_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
struct OfferWindow {
    started_at_ms: u64,
    count: u32,
}

/// The offer board with per-agent rate windows.
pub struct DirectWorkBoard {
    offers: DashMap<String, DirectWorkOffer>,
    windows: DashMap<String, OfferWindow>,
}

impl DirectWorkBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self {
            offers: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Post an offer. `kind` is `"work"` or `"model_fetch"`.
    pub fn offer(
        &self,
        kind: &str,
        from_agent_id: &str,
        to_agent_id: &str,
        payload: Value,
        per_agent_limit: u32,
        now_ms: u64,
    ) -> Result<DirectWorkOffer, ApiError> {
        if !self.check_window(from_agent_id, per_agent_limit, now_ms) {
            return Err(ApiError::rate_limited("direct_work_offer_rate_limited"));
        }
        let offer = DirectWorkOffer {
            offer_id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            from_agent_id: from_agent_id.to_string(),
            to_agent_id: to_agent_id.to_string(),
            payload,
            status: OfferStatus::Offered,
            created_at_ms: now_ms,
            output: None,
        };
        self.offers.insert(offer.offer_id.clone(), offer.clone());
        Ok(offer)
    }

    /// Addressee accepts.
    pub fn accept(&self, offer_id: &str, agent_id: &str) -> Result<(), ApiError> {
        let mut offer = self.get_mut(offer_id)?;
        if offer.status != OfferStatus::Offered || offer.to_agent_id != agent_id {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "offer_not_available",
                format!("offer {offer_id} cannot be accepted"),
            ));
        }
        offer.status = OfferStatus::Accepted;
        Ok(())
    }

    /// Addressee posts the result.
    pub fn complete(&self, offer_id: &str, agent_id: &str, output: Value) -> Result<(), ApiError> {
        let mut offer = self.get_mut(offer_id)?;
        if offer.status != OfferStatus::Accepted || offer.to_agent_id != agent_id {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "offer_not_accepted",
                format!("offer {offer_id} is not in accepted state"),
            ));
        }
        offer.status = OfferStatus::Completed;
        offer.output = Some(output);
        Ok(())
    }

    /// Look up an offer.
    pub fn get(&self, offer_id: &str) -> Option<DirectWorkOffer> {
        self.offers.get(offer_id).map(|o| o.clone())
    }

    /// Open offers addressed to an agent, for heartbeat delivery.
    pub fn offers_for(&self, agent_id: &str) -> Vec<Value> {
        self.offers
            .iter()
            .filter(|o| o.status == OfferStatus::Offered && o.to_agent_id == agent_id)
            .map(|o| {
                json!({
                    "offerId": o.offer_id,
                    "kind": o.kind,
                    "fromAgentId": o.from_agent_id,
                    "payload": o.payload,
                })
            })
            .collect()
    }

    /// Full audit view.
    pub fn audit(&self) -> Vec<DirectWorkOffer> {
        self.offers.iter().map(|o| o.clone()).collect()
    }

    fn check_window(&self, agent_id: &str, limit: u32, now_ms: u64) -> bool {
        let mut window = self
            .windows
            .entry(agent_id.to_string())
            .or_insert(OfferWindow {
                started_at_ms: now_ms,
                count: 0,
            });
        if now_ms.saturating_sub(window.started_at_ms) >= 10_000 {
            window.started_at_ms = now_ms;
            window.count = 0;
        }
        window.count += 1;
        window.count <= limit
    }

    fn get_mut(
        &self,
        offer_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, DirectWorkOffer>, ApiError> {
        self.offers.get_mut(offer_id).ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "offer_not_available",
                format!("offer {offer_id}"),
            )
        })
    }
}

impl Default for DirectWorkBoard {
    fn default() -> Self {
        Self::new()
    }
}
