//! Per-peer gossip rate accounting: fixed 10-second windows.

use dashmap::DashMap;

const WINDOW_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at_ms: u64,
    count: u32,
}

/// Sharded counter of messages per peer per window.
#[derive(Default)]
pub struct RateWindows {
    windows: DashMap<String, Window>,
}

impl RateWindows {
    /// Empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one message. Returns `false` when the peer exceeded `limit`
    /// within the current window.
    pub fn check(&self, peer_id: &str, limit: u32, now_ms: u64) -> bool {
        let mut window = self
            .windows
            .entry(peer_id.to_string())
            .or_insert(Window {
                started_at_ms: now_ms,
                count: 0,
            });
        if now_ms.saturating_sub(window.started_at_ms) >= WINDOW_MS {
            window.started_at_ms = now_ms;
            window.count = 0;
        }
        window.count += 1;
        window.count <= limit
    }

    /// Drop windows idle longer than one window length.
    pub fn prune(&self, now_ms: u64) {
        self.windows
            .retain(|_, w| now_ms.saturating_sub(w.started_at_ms) < WINDOW_MS * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_within_window_then_reset() {
        let rate = RateWindows::new();
        for _ in 0..3 {
            assert!(rate.check("p1", 3, 1_000));
        }
        assert!(!rate.check("p1", 3, 1_000));
        // New window resets the budget.
        assert!(rate.check("p1", 3, 11_001));
    }
}
