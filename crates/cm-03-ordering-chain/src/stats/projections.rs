//! # Read-Model Projections
//!
//! Derived views updated on every stats ingest. Both projections are pure
//! folds over the stats log: `rebuild` from an empty state and the same
//! records always reproduces the same view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ChainEventType, ChainRecord};
use std::collections::HashMap;

/// Node-status view: `node_id -> status`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: String,
    pub owner_email: String,
    pub approved: bool,
    pub last_seen_ms: u64,
    pub completed_tasks: u64,
}

/// Account-earnings view: `account_id -> credits + task count`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountEarnings {
    pub account_id: String,
    pub credits: u64,
    pub task_count: u64,
}

/// Projection of node approval/liveness from the stats log.
#[derive(Debug, Default)]
pub struct NodeStatusProjection {
    nodes: HashMap<String, NodeStatus>,
}

impl NodeStatusProjection {
    /// Fold one record into the view.
    pub fn apply(&mut self, record: &ChainRecord) {
        match record.event_type {
            ChainEventType::NodeApproval | ChainEventType::NodeValidation => {
                let entry = self.nodes.entry(record.actor_id.clone()).or_default();
                entry.node_id = record.actor_id.clone();
                entry.approved = true;
                entry.last_seen_ms = entry.last_seen_ms.max(record.issued_at_ms);
                if let Some(email) = payload_field(record, "ownerEmail") {
                    entry.owner_email = email;
                }
            }
            ChainEventType::TaskClaim => {
                let entry = self.nodes.entry(record.actor_id.clone()).or_default();
                entry.node_id = record.actor_id.clone();
                entry.last_seen_ms = entry.last_seen_ms.max(record.issued_at_ms);
            }
            ChainEventType::TaskComplete => {
                let entry = self.nodes.entry(record.actor_id.clone()).or_default();
                entry.node_id = record.actor_id.clone();
                entry.last_seen_ms = entry.last_seen_ms.max(record.issued_at_ms);
                entry.completed_tasks += 1;
            }
            _ => {}
        }
    }

    /// Snapshot one node.
    pub fn get(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.get(node_id).cloned()
    }

    /// Snapshot all nodes.
    pub fn all(&self) -> Vec<NodeStatus> {
        self.nodes.values().cloned().collect()
    }

    /// Rebuild from scratch.
    pub fn rebuild(records: &[ChainRecord]) -> Self {
        let mut projection = Self::default();
        for record in records {
            projection.apply(record);
        }
        projection
    }
}

/// Projection of account credits from `earnings_accrual` records.
#[derive(Debug, Default)]
pub struct EarningsProjection {
    accounts: HashMap<String, AccountEarnings>,
}

impl EarningsProjection {
    /// Fold one record into the view.
    pub fn apply(&mut self, record: &ChainRecord) {
        if record.event_type != ChainEventType::EarningsAccrual {
            return;
        }
        let Some(account_id) = payload_field(record, "accountId") else {
            return;
        };
        let credits = record
            .payload_json
            .as_deref()
            .and_then(|p| serde_json::from_str::<Value>(p).ok())
            .and_then(|v| v.get("credits").and_then(Value::as_u64))
            .unwrap_or(0);

        let entry = self.accounts.entry(account_id.clone()).or_default();
        entry.account_id = account_id;
        entry.credits += credits;
        entry.task_count += 1;
    }

    /// Snapshot one account.
    pub fn get(&self, account_id: &str) -> Option<AccountEarnings> {
        self.accounts.get(account_id).cloned()
    }

    /// Snapshot all accounts.
    pub fn all(&self) -> Vec<AccountEarnings> {
        self.accounts.values().cloned().collect()
    }

    /// Credit an account directly (payment settlement path).
    pub fn credit(&mut self, account_id: &str, credits: u64) {
        let entry = self.accounts.entry(account_id.to_string()).or_default();
        entry.account_id = account_id.to_string();
        entry.credits += credits;
    }

    /// Debit an account, saturating at zero. Returns `false` when the
    /// balance was insufficient (and leaves it untouched).
    pub fn debit(&mut self, account_id: &str, credits: u64) -> bool {
        match self.accounts.get_mut(account_id) {
            Some(entry) if entry.credits >= credits => {
                entry.credits -= credits;
                true
            }
            _ => false,
        }
    }

    /// Rebuild from scratch.
    pub fn rebuild(records: &[ChainRecord]) -> Self {
        let mut projection = Self::default();
        for record in records {
            projection.apply(record);
        }
        projection
    }
}

fn payload_field(record: &ChainRecord, field: &str) -> Option<String> {
    record
        .payload_json
        .as_deref()
        .and_then(|p| serde_json::from_str::<Value>(p).ok())
        .and_then(|v| v.get(field).and_then(Value::as_str).map(str::to_string))
}
