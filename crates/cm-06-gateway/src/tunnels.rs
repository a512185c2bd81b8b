//! # Agent Tunnels
//!
//! Coordinator-relayed channels between two agents. Ephemeral: invites and
//! frames are delivered on heartbeat, idle tunnels are swept by the GC loop,
//! and relays are capped per agent (10 s window) and per tunnel (1 min
//! window).

use crate::domain::error::ApiError;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum TunnelState {
    Invited,
    Active,
    Closing,
}

#[derive(Debug, Clone)]
struct Tunnel {
    tunnel_id: String,
    from_agent_id: String,
    to_agent_id: String,
    state: TunnelState,
    created_at_ms: u64,
    last_activity_ms: u64,
    relays_this_min: u32,
    relay_window_start_ms: u64,
    /// Frames waiting per agent id.
    pending: Vec<(String, String)>,
    /// Close notice owed to this agent, if any.
    close_pending_for: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct RelayWindow {
    started_at_ms: u64,
    count: u32,
}

/// The tunnel table with its rate windows.
pub struct TunnelTable {
    tunnels: DashMap<String, Tunnel>,
    relay_windows: DashMap<String, RelayWindow>,
}

impl TunnelTable {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            tunnels: DashMap::new(),
            relay_windows: DashMap::new(),
        }
    }

    /// Open an invite from one agent to another.
    pub fn connect(&self, from_agent_id: &str, to_agent_id: &str, now_ms: u64) -> String {
        let tunnel_id = uuid::Uuid::new_v4().to_string();
        self.tunnels.insert(
            tunnel_id.clone(),
            Tunnel {
                tunnel_id: tunnel_id.clone(),
                from_agent_id: from_agent_id.to_string(),
                to_agent_id: to_agent_id.to_string(),
                state: TunnelState::Invited,
                created_at_ms: now_ms,
                last_activity_ms: now_ms,
                relays_this_min: 0,
                relay_window_start_ms: now_ms,
                pending: Vec::new(),
                close_pending_for: None,
            },
        );
        tunnel_id
    }

    /// Callee accepts the invite.
    pub fn accept(&self, tunnel_id: &str, agent_id: &str, now_ms: u64) -> Result<(), ApiError> {
        let mut tunnel = self.get_mut(tunnel_id)?;
        if tunnel.to_agent_id != agent_id {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "tunnel_not_found",
                "agent is not the invitee",
            ));
        }
        tunnel.state = TunnelState::Active;
        tunnel.last_activity_ms = now_ms;
        Ok(())
    }

    /// Relay a frame through an active tunnel.
    pub fn relay(
        &self,
        tunnel_id: &str,
        from_agent_id: &str,
        payload: &str,
        per_agent_limit: u32,
        per_tunnel_limit: u32,
        max_payload: usize,
        now_ms: u64,
    ) -> Result<(), ApiError> {
        if payload.len() > max_payload {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "relay_payload_too_large",
                format!("payload {} bytes over the {max_payload} cap", payload.len()),
            ));
        }
        if !self.check_agent_window(from_agent_id, per_agent_limit, now_ms) {
            return Err(ApiError::rate_limited("relay_rate_limited"));
        }

        let mut tunnel = self.get_mut(tunnel_id)?;
        if tunnel.state != TunnelState::Active {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "tunnel_not_found",
                "tunnel is not active",
            ));
        }
        if now_ms.saturating_sub(tunnel.relay_window_start_ms) >= 60_000 {
            tunnel.relay_window_start_ms = now_ms;
            tunnel.relays_this_min = 0;
        }
        if tunnel.relays_this_min >= per_tunnel_limit {
            return Err(ApiError::rate_limited("tunnel_relay_cap_reached"));
        }
        tunnel.relays_this_min += 1;
        tunnel.last_activity_ms = now_ms;

        let recipient = if tunnel.from_agent_id == from_agent_id {
            tunnel.to_agent_id.clone()
        } else {
            tunnel.from_agent_id.clone()
        };
        tunnel.pending.push((recipient, payload.to_string()));
        Ok(())
    }

    /// Begin teardown; the peer gets a close notice on heartbeat.
    pub fn close(&self, tunnel_id: &str, agent_id: &str, now_ms: u64) -> Result<(), ApiError> {
        let mut tunnel = self.get_mut(tunnel_id)?;
        let peer = if tunnel.from_agent_id == agent_id {
            tunnel.to_agent_id.clone()
        } else {
            tunnel.from_agent_id.clone()
        };
        tunnel.state = TunnelState::Closing;
        tunnel.close_pending_for = Some(peer);
        tunnel.last_activity_ms = now_ms;
        Ok(())
    }

    /// Peer acknowledged the close; the tunnel is gone.
    pub fn close_ack(&self, tunnel_id: &str, _agent_id: &str) -> Result<(), ApiError> {
        if self.tunnels.remove(tunnel_id).is_none() {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "tunnel_not_found",
                format!("tunnel {tunnel_id}"),
            ));
        }
        Ok(())
    }

    /// Invites waiting for this agent, for heartbeat delivery.
    pub fn invites_for(&self, agent_id: &str) -> Vec<Value> {
        self.tunnels
            .iter()
            .filter(|t| t.state == TunnelState::Invited && t.to_agent_id == agent_id)
            .map(|t| {
                json!({
                    "tunnelId": t.tunnel_id,
                    "fromAgentId": t.from_agent_id,
                })
            })
            .collect()
    }

    /// Close notices owed to this agent; consumed on delivery.
    pub fn close_notices_for(&self, agent_id: &str) -> Vec<Value> {
        let mut notices = Vec::new();
        for mut tunnel in self.tunnels.iter_mut() {
            if tunnel.close_pending_for.as_deref() == Some(agent_id) {
                notices.push(json!({"tunnelId": tunnel.tunnel_id}));
                tunnel.close_pending_for = None;
            }
        }
        notices
    }

    /// Frames waiting for this agent; consumed on delivery.
    pub fn drain_frames_for(&self, agent_id: &str) -> Vec<Value> {
        let mut frames = Vec::new();
        for mut tunnel in self.tunnels.iter_mut() {
            let tunnel_id = tunnel.tunnel_id.clone();
            let (matched, rest): (Vec<_>, Vec<_>) = tunnel
                .pending
                .drain(..)
                .partition(|(recipient, _)| recipient == agent_id);
            tunnel.pending = rest;
            for (_, payload) in matched {
                frames.push(json!({"tunnelId": tunnel_id, "payload": payload}));
            }
        }
        frames
    }

    /// Sweep idle tunnels. Returns how many were removed.
    pub fn gc(&self, idle_ttl_ms: u64, now_ms: u64) -> usize {
        let before = self.tunnels.len();
        self.tunnels
            .retain(|_, t| now_ms.saturating_sub(t.last_activity_ms) <= idle_ttl_ms);
        self.relay_windows
            .retain(|_, w| now_ms.saturating_sub(w.started_at_ms) < 20_000);
        before - self.tunnels.len()
    }

    /// Number of live tunnels.
    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    /// True when no tunnels exist.
    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    fn check_agent_window(&self, agent_id: &str, limit: u32, now_ms: u64) -> bool {
        let mut window = self
            .relay_windows
            .entry(agent_id.to_string())
            .or_insert(RelayWindow {
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
        tunnel_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Tunnel>, ApiError> {
        self.tunnels.get_mut(tunnel_id).ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "tunnel_not_found",
                format!("tunnel {tunnel_id}"),
            )
        })
    }
}

impl Default for TunnelTable {
    fn default() -> Self {
        Self::new()
    }
}
