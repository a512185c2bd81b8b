//! Background loops.
//!
//! Every loop is a dedicated task that logs failures and keeps ticking; no
//! loop dies silently. Cadences:
//!
//! | Loop | Cadence |
//! |------|---------|
//! | tunnel GC | 15 s |
//! | payment reconcile | 30 s |
//! | issuance tick + outbox drain | `issuance_recalc_ms` |
//! | epoch anchoring | `anchor_interval_ms` |
//! | peer bootstrap | 45 s (and once at startup) |
//! | peer exchange broadcast | 30 s |
//! | capability summary broadcast | 60 s |
//! | stats ledger sync + checkpoint signing | `stats_ledger_sync_interval_ms` |
//! | stats anchoring + reorg reconcile | `stats_anchor_interval_ms` |
//! | nonce / envelope-key / rate-window prune | 5 min |

use crate::container::Coordinator;
use shared_types::{CapabilitySummaryPayload, MeshMessageType, PeerRole};
use std::time::Duration;
use tracing::{debug, warn};

/// Spawn every background loop.
pub fn spawn_all(coordinator: &Coordinator) {
    spawn_tunnel_gc(coordinator);
    spawn_payment_reconcile(coordinator);
    spawn_issuance(coordinator);
    spawn_epoch_anchor(coordinator);
    spawn_bootstrap(coordinator);
    spawn_peer_exchange(coordinator);
    spawn_capability_summary(coordinator);
    spawn_stats_sync(coordinator);
    spawn_stats_anchor(coordinator);
    spawn_prune(coordinator);
}

fn spawn_tunnel_gc(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(15));
        loop {
            tick.tick().await;
            let swept = state
                .tunnels
                .gc(state.config.tunnel_idle_ttl_ms, state.now_ms());
            if swept > 0 {
                debug!(swept, "tunnel gc");
            }
        }
    });
}

fn spawn_payment_reconcile(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            let expired = state.settlement.payments().reconcile(state.now_ms());
            if expired > 0 {
                debug!(expired, "payment intents expired");
            }
        }
    });
}

fn spawn_issuance(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    let outbox = coordinator.outbox.clone();
    let recalc_ms = coordinator.config.issuance_recalc_ms.max(1_000);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(recalc_ms));
        loop {
            tick.tick().await;
            let now_ms = state.now_ms();

            let contributions: Vec<(String, u64)> = state
                .chain
                .stats()
                .with_earnings(|e| e.all())
                .into_iter()
                .map(|a| (a.account_id, a.credits))
                .collect();
            let raw_load = state.queue.queued_len() as f64;
            let approved = state.mesh.table().coordinator_count() + 1;

            match state
                .settlement
                .issuance_tick(&contributions, raw_load, approved, now_ms)
            {
                Ok(records) => {
                    for record in records {
                        let message_type = match record.record_type {
                            shared_types::QuorumRecordType::IssuanceProposal => {
                                MeshMessageType::IssuanceProposal
                            }
                            shared_types::QuorumRecordType::IssuanceVote => {
                                MeshMessageType::IssuanceVote
                            }
                            shared_types::QuorumRecordType::IssuanceCommit => {
                                MeshMessageType::IssuanceCommit
                            }
                            shared_types::QuorumRecordType::IssuanceCheckpoint => {
                                MeshMessageType::IssuanceCheckpoint
                            }
                        };
                        if let Ok(value) = serde_json::to_value(&record) {
                            state.mesh.broadcast(message_type, value, now_ms).await;
                        }
                    }
                }
                Err(error) => warn!(%error, "issuance tick failed"),
            }

            // Commits produced by remote votes inside gossip handlers.
            for (message_type, payload) in outbox.drain() {
                state.mesh.broadcast(message_type, payload, now_ms).await;
            }
        }
    });
}

fn spawn_epoch_anchor(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    let interval_ms = coordinator.config.anchor_interval_ms.max(1_000);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tick.tick().await;
            let reachable: Vec<String> = state
                .mesh
                .table()
                .coordinators()
                .into_iter()
                .map(|p| p.identity.peer_id)
                .collect();
            if !state.settlement.is_anchor_leader(&reachable) {
                continue;
            }
            let now_ms = state.now_ms();
            match state.settlement.anchor_finalized_epochs(now_ms).await {
                Ok(checkpoints) => {
                    for record in checkpoints {
                        if let Ok(value) = serde_json::to_value(&record) {
                            state
                                .mesh
                                .broadcast(MeshMessageType::IssuanceCheckpoint, value, now_ms)
                                .await;
                        }
                    }
                }
                Err(error) => warn!(%error, "epoch anchoring failed"),
            }
        }
    });
}

fn spawn_bootstrap(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    let bootstrap = coordinator.bootstrap.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(45));
        loop {
            tick.tick().await;
            let reached = bootstrap.run_cycle(state.mesh.table(), state.now_ms()).await;
            debug!(reached, "bootstrap cycle");
        }
    });
}

fn spawn_peer_exchange(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            let now_ms = state.now_ms();
            let payload = state.mesh.exchange_payload(now_ms);
            if let Ok(value) = serde_json::to_value(&payload) {
                state
                    .mesh
                    .broadcast(MeshMessageType::PeerExchange, value, now_ms)
                    .await;
            }
        }
    });
}

fn spawn_capability_summary(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let now_ms = state.now_ms();
            let live = state.registry.directory().live_agents(now_ms);
            let mut models: Vec<String> = live
                .iter()
                .flat_map(|a| a.model_catalog.iter().cloned())
                .collect();
            models.sort();
            models.dedup();
            let payload = CapabilitySummaryPayload {
                coordinator_id: state.mesh.identity().peer_id.clone(),
                live_agents: live.len() as u32,
                total_max_concurrent: live.iter().map(|a| a.max_concurrent_tasks).sum(),
                models,
            };
            if let Ok(value) = serde_json::to_value(&payload) {
                state
                    .mesh
                    .broadcast(MeshMessageType::CapabilitySummary, value, now_ms)
                    .await;
            }
        }
    });
}

fn spawn_stats_sync(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    let syncer = coordinator.syncer.clone();
    let interval_ms = coordinator.config.stats_ledger_sync_interval_ms.max(1_000);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tick.tick().await;
            for peer in state.mesh.table().all() {
                if peer.identity.role != PeerRole::Coordinator {
                    continue;
                }
                syncer
                    .sync_with_peer(
                        &peer.identity.peer_id,
                        &peer.reachable_url,
                        state.chain.stats(),
                        state.key_directory.as_ref(),
                    )
                    .await;
            }

            // Requeue stale claims alongside replication so recovery does
            // not need its own loop.
            let requeued = state.queue.requeue_stale();
            if !requeued.is_empty() {
                debug!(count = requeued.len(), "stale claims requeued");
            }

            let known = state.mesh.table().coordinator_count() + 1;
            if let Err(error) = state.chain.sign_and_maybe_commit(known, state.now_ms()) {
                warn!(%error, "stats checkpoint signing failed");
            }
        }
    });
}

fn spawn_stats_anchor(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    let interval_ms = coordinator.config.stats_anchor_interval_ms.max(1_000);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tick.tick().await;
            state.settlement.reconcile_anchors().await;

            let reachable: Vec<String> = state
                .mesh
                .table()
                .coordinators()
                .into_iter()
                .map(|p| p.identity.peer_id)
                .collect();
            if !state.settlement.is_anchor_leader(&reachable) {
                continue;
            }
            if let Some((hash, _)) =
                cm_03_ordering_chain::stats::checkpoint::current_candidate(state.chain.stats())
            {
                state.settlement.anchor_checkpoint("stats", &hash).await;
            }
        }
    });
}

fn spawn_prune(coordinator: &Coordinator) {
    let state = coordinator.state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            let now_ms = state.now_ms();
            state.nonces.prune(now_ms);
            let pruned = state.envelope_keys.prune(now_ms);
            state.mesh.prune_rate_windows(now_ms);
            let swept = state.registry.directory().sweep_stale(now_ms, 3_600_000);
            debug!(envelope_keys = pruned, agents = swept.len(), "prune pass");
        }
    });
}
