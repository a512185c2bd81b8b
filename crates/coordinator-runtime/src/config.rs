//! Coordinator configuration.
//!
//! Loaded from a TOML file (path via `--config` or `COORDINATOR_CONFIG`),
//! with environment overrides for the secrets. Every field has an operating
//! default so a bare `coordinator` starts a single-node mesh.

use serde::Deserialize;
use std::path::Path;

/// Full runtime configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Listen address for the gateway.
    pub listen_addr: String,
    /// Public URL peers reach us on; also the peer-id derivation input.
    pub coordinator_public_url: String,
    /// Explicit peer id; derived from the URL when empty.
    pub coordinator_peer_id: String,
    /// Shared mesh auth token.
    pub mesh_token: String,
    /// Bootstrap seed URLs.
    pub coordinator_bootstrap_urls: Vec<String>,
    /// Registration token used when joining another mesh.
    pub coordinator_registration_token: String,
    /// PEM file holding the coordinator's Ed25519 private key; generated on
    /// first boot when missing.
    pub coordinator_private_key_path: String,
    /// `public` or `overlay`.
    pub network_mode: String,

    /// Portal service base URL; empty disables validation.
    pub portal_service_url: String,
    /// Server-to-server token for the portal.
    pub portal_service_token: String,

    /// Inference service base URL; empty means no local decomposition.
    pub inference_service_url: String,

    /// Local model provider (`ollama`).
    pub local_model_provider: String,
    /// Ollama host for the coordinator's own models.
    pub ollama_host: String,
    /// Default Ollama model.
    pub ollama_model: String,
    /// Auto-install Ollama on agents that ask.
    pub ollama_auto_install: bool,

    /// External anchor service base URL; empty uses the local no-op anchor.
    pub anchor_service_url: String,
    /// Settlement network label recorded on anchors.
    pub anchor_network: String,
    /// Epoch anchoring cadence.
    pub anchor_interval_ms: u64,
    /// Stats checkpoint anchoring cadence.
    pub stats_anchor_interval_ms: u64,
    /// Confirmations the anchor service waits for.
    pub stats_anchor_confirmations: u32,
    /// Stats replication cadence.
    pub stats_ledger_sync_interval_ms: u64,

    /// Issuance window.
    pub issuance_window_ms: u64,
    /// Issuance recalc cadence.
    pub issuance_recalc_ms: u64,
    /// Daily pool cap.
    pub issuance_pool_cap: u64,

    /// Payment intent TTL.
    pub payment_intent_ttl_ms: u64,
    /// Coordinator fee on settlements, basis points.
    pub coordinator_fee_bps: u32,

    /// Tunnel idle TTL.
    pub tunnel_idle_ttl_ms: u64,
    /// Relays per agent per 10 s.
    pub relay_rate_limit_per_10s: u32,
    /// Relays per tunnel per minute.
    pub tunnel_max_relays_per_min: u32,
    /// Direct-work offers per agent per 10 s.
    pub direct_work_offers_per_10s: u32,

    /// Per-agent request budget.
    pub agent_rate_limit_max: u32,
    /// Per-agent request window.
    pub agent_rate_limit_window_ms: u64,

    /// On battery at or below this level, no coordinator tasks.
    pub battery_task_stop_level_pct: f64,
    /// On battery, minimum pull interval.
    pub battery_min_pull_interval_ms: u64,

    /// Agents must be seen inside this window for orchestration.
    pub agent_orchestration_online_window_ms: u64,

    /// Disk peer cache path.
    pub peer_cache_path: String,
    /// Delay before local agents may claim a just-submitted subtask.
    pub offer_claim_delay_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8844".into(),
            coordinator_public_url: "http://127.0.0.1:8844".into(),
            coordinator_peer_id: String::new(),
            mesh_token: String::new(),
            coordinator_bootstrap_urls: Vec::new(),
            coordinator_registration_token: String::new(),
            coordinator_private_key_path: "coordinator-key.pem".into(),
            network_mode: "public".into(),
            portal_service_url: String::new(),
            portal_service_token: String::new(),
            inference_service_url: String::new(),
            local_model_provider: "ollama".into(),
            ollama_host: "http://127.0.0.1:11434".into(),
            ollama_model: "qwen2.5-coder:7b".into(),
            ollama_auto_install: false,
            anchor_service_url: String::new(),
            anchor_network: "testnet".into(),
            anchor_interval_ms: 10 * 60 * 1000,
            stats_anchor_interval_ms: 15 * 60 * 1000,
            stats_anchor_confirmations: 3,
            stats_ledger_sync_interval_ms: 20_000,
            issuance_window_ms: 24 * 60 * 60 * 1000,
            issuance_recalc_ms: 10 * 60 * 1000,
            issuance_pool_cap: 100_000,
            payment_intent_ttl_ms: 15 * 60 * 1000,
            coordinator_fee_bps: 250,
            tunnel_idle_ttl_ms: 120_000,
            relay_rate_limit_per_10s: 20,
            tunnel_max_relays_per_min: 120,
            direct_work_offers_per_10s: 5,
            agent_rate_limit_max: 120,
            agent_rate_limit_window_ms: 60_000,
            battery_task_stop_level_pct: 20.0,
            battery_min_pull_interval_ms: 30_000,
            agent_orchestration_online_window_ms: 10 * 60 * 1000,
            peer_cache_path: "peer-cache.json".into(),
            offer_claim_delay_ms: 0,
        }
    }
}

impl CoordinatorConfig {
    /// Load from a TOML file, then apply environment overrides for the
    /// secrets and URLs that change per deployment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            _ => Self::default(),
        };

        let overrides: [(&str, &mut String); 6] = [
            ("MESH_TOKEN", &mut config.mesh_token),
            ("COORDINATOR_PUBLIC_URL", &mut config.coordinator_public_url),
            ("PORTAL_SERVICE_URL", &mut config.portal_service_url),
            ("PORTAL_SERVICE_TOKEN", &mut config.portal_service_token),
            ("INFERENCE_SERVICE_URL", &mut config.inference_service_url),
            ("ANCHOR_SERVICE_URL", &mut config.anchor_service_url),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                *slot = value;
            }
        }
        if let Ok(urls) = std::env::var("COORDINATOR_BOOTSTRAP_URLS") {
            config.coordinator_bootstrap_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let config: CoordinatorConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8844");
        assert_eq!(config.issuance_recalc_ms, 10 * 60 * 1000);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
            mesh_token = "tok"
            coordinator_bootstrap_urls = ["http://seed-1:8844"]
            "#,
        )
        .unwrap();
        assert_eq!(config.mesh_token, "tok");
        assert_eq!(config.coordinator_bootstrap_urls.len(), 1);
        assert_eq!(config.coordinator_fee_bps, 250);
    }
}
