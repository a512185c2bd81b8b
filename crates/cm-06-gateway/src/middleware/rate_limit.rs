//! Per-agent rate limiting using token buckets.
//!
//! One `governor` bucket per agent id, created lazily. Loopback requests
//! bypass the check at the call site (never the signature check).

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-agent token buckets.
pub struct AgentRateLimiter {
    buckets: DashMap<String, Bucket>,
    quota: Quota,
}

impl AgentRateLimiter {
    /// Budget of `max` requests per `window_ms`.
    pub fn new(max: u32, window_ms: u64) -> Self {
        let burst = NonZeroU32::new(max.max(1)).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_millis((window_ms / u64::from(max.max(1))).max(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            buckets: DashMap::new(),
            quota,
        }
    }

    /// Take one token. `false` means the agent is over budget.
    pub fn check(&self, agent_id: &str) -> bool {
        self.buckets
            .entry(agent_id.to_string())
            .or_insert_with(|| RateLimiter::direct(self.quota))
            .check()
            .is_ok()
    }

    /// Reset an agent's bucket (fresh registration).
    pub fn reset(&self, agent_id: &str) {
        self.buckets.remove(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_exhausts_then_refuses() {
        let limiter = AgentRateLimiter::new(3, 60_000);
        assert!(limiter.check("w1"));
        assert!(limiter.check("w1"));
        assert!(limiter.check("w1"));
        assert!(!limiter.check("w1"));
        // Another agent has its own bucket.
        assert!(limiter.check("w2"));
    }

    #[test]
    fn reset_restores_budget() {
        let limiter = AgentRateLimiter::new(1, 60_000);
        assert!(limiter.check("w1"));
        assert!(!limiter.check("w1"));
        limiter.reset("w1");
        assert!(limiter.check("w1"));
    }
}
