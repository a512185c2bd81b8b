//! Price epochs and treasury policy, at interface level.
//!
//! The negotiation protocol itself lives outside the coordinator core;
//! this store carries the current epoch and accepts proposals so the
//! economy routes have real state to serve.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One pricing epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEpoch {
    pub epoch_id: String,
    /// Credits charged per decomposed subtask.
    pub credits_per_subtask: u64,
    /// Coordinator fee in basis points.
    pub coordinator_fee_bps: u32,
    pub started_at_ms: u64,
}

/// Treasury policy view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryPolicy {
    pub reserve_credits: u64,
    pub payout_floor_credits: u64,
}

impl Default for TreasuryPolicy {
    fn default() -> Self {
        Self {
            reserve_credits: 10_000,
            payout_floor_credits: 10,
        }
    }
}

/// Current pricing state.
pub struct PriceBook {
    current: RwLock<PriceEpoch>,
    treasury: RwLock<TreasuryPolicy>,
}

impl PriceBook {
    /// Book starting from the default epoch.
    pub fn new(coordinator_fee_bps: u32, now_ms: u64) -> Self {
        Self {
            current: RwLock::new(PriceEpoch {
                epoch_id: "price-epoch-0".into(),
                credits_per_subtask: 1,
                coordinator_fee_bps,
                started_at_ms: now_ms,
            }),
            treasury: RwLock::new(TreasuryPolicy::default()),
        }
    }

    /// The epoch in force.
    pub fn current(&self) -> PriceEpoch {
        self.current.read().clone()
    }

    /// Adopt a proposed epoch.
    pub fn propose(&self, credits_per_subtask: u64, now_ms: u64) -> PriceEpoch {
        let mut current = self.current.write();
        let next_id = format!("price-epoch-{now_ms}");
        *current = PriceEpoch {
            epoch_id: next_id,
            credits_per_subtask,
            coordinator_fee_bps: current.coordinator_fee_bps,
            started_at_ms: now_ms,
        };
        current.clone()
    }

    /// Treasury policy view.
    pub fn treasury(&self) -> TreasuryPolicy {
        self.treasury.read().clone()
    }
}
