//! # Issuance Epochs
//!
//! Every recalc interval the coordinator computes an epoch: contribution
//! shares over the rolling window, a smoothed load index, a daily pool from
//! a capped linear curve, and per-account allocations.

use serde::{Deserialize, Serialize};

/// Issuance tunables.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Rolling contribution window.
    pub window_ms: u64,
    /// Recalc cadence.
    pub recalc_ms: u64,
    /// Pool floor when the mesh is idle.
    pub pool_base: u64,
    /// Pool growth per load-index point.
    pub pool_slope: f64,
    /// Hard daily cap on the pool.
    pub pool_cap: u64,
    /// Exponential smoothing factor for the load index.
    pub load_smoothing: f64,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            window_ms: 24 * 60 * 60 * 1000,
            recalc_ms: 10 * 60 * 1000,
            pool_base: 1_000,
            pool_slope: 50.0,
            pool_cap: 100_000,
            load_smoothing: 0.3,
        }
    }
}

/// One account's cut of an epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub account_id: String,
    /// Share of window contribution, in [0, 1].
    pub share: f64,
    pub amount: u64,
}

/// A computed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceEpoch {
    pub epoch_id: String,
    pub window_start_ms: u64,
    pub window_end_ms: u64,
    pub load_index: f64,
    pub pool: u64,
    pub allocations: Vec<Allocation>,
}

/// Epoch computation with load-index memory.
#[derive(Debug, Default)]
pub struct IssuanceEngine {
    smoothed_load: f64,
}

impl IssuanceEngine {
    /// Fresh engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current smoothed load index.
    pub fn load_index(&self) -> f64 {
        self.smoothed_load
    }

    /// Compute an epoch from window contributions.
    ///
    /// `contributions` are `(account_id, credits earned in window)`;
    /// `raw_load` is the instantaneous mesh load (tasks completed in the
    /// window normalized by capacity).
    pub fn compute_epoch(
        &mut self,
        config: &IssuanceConfig,
        contributions: &[(String, u64)],
        raw_load: f64,
        now_ms: u64,
    ) -> IssuanceEpoch {
        self.smoothed_load = config.load_smoothing * raw_load
            + (1.0 - config.load_smoothing) * self.smoothed_load;

        let pool = (config.pool_base as f64 + config.pool_slope * self.smoothed_load)
            .min(config.pool_cap as f64)
            .floor() as u64;

        let total: u64 = contributions.iter().map(|(_, c)| *c).sum();
        let allocations = if total == 0 {
            Vec::new()
        } else {
            contributions
                .iter()
                .filter(|(_, credits)| *credits > 0)
                .map(|(account_id, credits)| {
                    let share = *credits as f64 / total as f64;
                    Allocation {
                        account_id: account_id.clone(),
                        share,
                        amount: (share * pool as f64).floor() as u64,
                    }
                })
                .collect()
        };

        IssuanceEpoch {
            epoch_id: format!("epoch-{}", now_ms / config.recalc_ms),
            window_start_ms: now_ms.saturating_sub(config.window_ms),
            window_end_ms: now_ms,
            load_index: self.smoothed_load,
            pool,
            allocations,
        }
    }
}
