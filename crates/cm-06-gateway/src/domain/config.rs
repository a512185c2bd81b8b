//! Gateway configuration.

/// Cross-cutting gateway tunables. Field defaults match the documented
/// operating values; the runtime overrides them from its config file.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared mesh auth token.
    pub mesh_token: String,
    /// Token the portal service uses for projection/diagnostics routes.
    pub portal_service_token: String,
    /// Per-agent requests per window.
    pub agent_rate_limit_max: u32,
    /// Per-agent rate window.
    pub agent_rate_limit_window_ms: u64,
    /// Tunnel relays per agent per 10 s.
    pub relay_rate_limit_per_10s: u32,
    /// Relays per tunnel per minute.
    pub tunnel_max_relays_per_min: u32,
    /// Direct-work offers per agent per 10 s.
    pub direct_work_offers_per_10s: u32,
    /// Relay payload cap in bytes.
    pub relay_max_payload_bytes: usize,
    /// Tunnel idle TTL before GC.
    pub tunnel_idle_ttl_ms: u64,
    /// Payment intent TTL.
    pub payment_intent_ttl_ms: u64,
    /// Delay peers get to claim an offered subtask before local agents.
    pub offer_claim_delay_ms: u64,
    /// Agents must be seen within this window for orchestration commands.
    pub orchestration_online_window_ms: u64,
    /// Request body cap.
    pub body_limit_bytes: usize,
    /// Per-route handler timeout.
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mesh_token: String::new(),
            portal_service_token: String::new(),
            agent_rate_limit_max: 120,
            agent_rate_limit_window_ms: 60_000,
            relay_rate_limit_per_10s: 20,
            tunnel_max_relays_per_min: 120,
            direct_work_offers_per_10s: 5,
            relay_max_payload_bytes: 64 * 1024,
            tunnel_idle_ttl_ms: 120_000,
            payment_intent_ttl_ms: 15 * 60 * 1000,
            offer_claim_delay_ms: 0,
            orchestration_online_window_ms: 10 * 60 * 1000,
            body_limit_bytes: 1024 * 1024,
            request_timeout_ms: 5_000,
        }
    }
}
