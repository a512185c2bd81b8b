//! Power-aware scheduling policy.
//!
//! Agents report battery telemetry on heartbeat; `/pull` consults the
//! decision before handing out work so a phone on 15% battery stops pulling
//! and an unplugged laptop pulls at a slower cadence.

use shared_types::{PowerDecision, PowerTelemetry};

/// Thresholds for the power policy.
#[derive(Debug, Clone)]
pub struct PowerPolicyConfig {
    /// On battery at or below this level, coordinator tasks stop entirely.
    pub battery_task_stop_level_pct: f64,
    /// On battery above the stop level, minimum interval between pulls.
    pub battery_min_pull_interval_ms: u64,
    /// On battery, restrict to small tasks below this level.
    pub battery_small_tasks_level_pct: f64,
}

impl Default for PowerPolicyConfig {
    fn default() -> Self {
        Self {
            battery_task_stop_level_pct: 20.0,
            battery_min_pull_interval_ms: 30_000,
            battery_small_tasks_level_pct: 50.0,
        }
    }
}

/// Evaluate telemetry into a pull decision.
///
/// `last_pull_ms` is the agent's previous successful pull, used to enforce
/// the on-battery cadence via `defer_ms`.
pub fn evaluate(
    config: &PowerPolicyConfig,
    telemetry: Option<&PowerTelemetry>,
    last_pull_ms: Option<u64>,
    now_ms: u64,
) -> PowerDecision {
    let Some(power) = telemetry else {
        return allow("no telemetry");
    };

    if !power.on_battery {
        return allow("on mains power");
    }

    if let Some(level) = power.battery_level_pct {
        if level <= config.battery_task_stop_level_pct {
            return PowerDecision {
                allow_coordinator_tasks: false,
                allow_small_tasks_only: false,
                defer_ms: 0,
                reason: format!("battery {level:.0}% at or below stop threshold"),
            };
        }
    }

    let elapsed = last_pull_ms.map(|at| now_ms.saturating_sub(at));
    let defer_ms = match elapsed {
        Some(elapsed) if elapsed < config.battery_min_pull_interval_ms => {
            config.battery_min_pull_interval_ms - elapsed
        }
        _ => 0,
    };

    let small_only = power.low_power_mode
        || power
            .battery_level_pct
            .map(|level| level <= config.battery_small_tasks_level_pct)
            .unwrap_or(false);

    PowerDecision {
        allow_coordinator_tasks: true,
        allow_small_tasks_only: small_only,
        defer_ms,
        reason: if defer_ms > 0 {
            "on battery, pull cadence enforced".into()
        } else {
            "on battery".into()
        },
    }
}

fn allow(reason: &str) -> PowerDecision {
    PowerDecision {
        allow_coordinator_tasks: true,
        allow_small_tasks_only: false,
        defer_ms: 0,
        reason: reason.into(),
    }
}
