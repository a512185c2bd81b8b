//! # Payment Intents
//!
//! `created -> settled | expired`. Settlement is keyed by an external
//! transaction reference; a `tx_ref` set refuses double settlement so two
//! confirmations of the same transfer mint credits at most once.

use super::errors::SettlementError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Intent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentIntentStatus {
    Created,
    Settled,
    Expired,
}

/// A credit purchase awaiting external settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub intent_id: String,
    pub account_id: String,
    pub credits: u64,
    pub status: PaymentIntentStatus,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    #[serde(default)]
    pub tx_ref: Option<String>,
}

impl PaymentIntent {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.ttl_ms
    }
}

/// Intent store with the double-settlement guard.
#[derive(Default)]
pub struct PaymentLedger {
    intents: DashMap<String, PaymentIntent>,
    used_tx_refs: Mutex<HashSet<String>>,
}

impl PaymentLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an intent.
    pub fn create(&self, account_id: &str, credits: u64, ttl_ms: u64, now_ms: u64) -> PaymentIntent {
        let intent = PaymentIntent {
            intent_id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            credits,
            status: PaymentIntentStatus::Created,
            created_at_ms: now_ms,
            ttl_ms,
            tx_ref: None,
        };
        self.intents.insert(intent.intent_id.clone(), intent.clone());
        intent
    }

    /// Look up an intent.
    pub fn get(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.get(intent_id).map(|i| i.clone())
    }

    /// Confirm an intent with an external `tx_ref`.
    ///
    /// Returns the credits to mint; exactly one confirmation per `tx_ref`
    /// ever succeeds, and repeat confirmations of an already settled intent
    /// mint nothing.
    pub fn confirm(
        &self,
        intent_id: &str,
        tx_ref: &str,
        now_ms: u64,
    ) -> Result<u64, SettlementError> {
        // Reserve the tx_ref before touching the intent so two racing
        // confirmations cannot both pass the check.
        if !self.used_tx_refs.lock().insert(tx_ref.to_string()) {
            return Err(SettlementError::DuplicateTxRef);
        }

        let release = |refs: &Mutex<HashSet<String>>| {
            refs.lock().remove(tx_ref);
        };

        let Some(mut intent) = self.intents.get_mut(intent_id) else {
            release(&self.used_tx_refs);
            return Err(SettlementError::IntentNotFound(intent_id.to_string()));
        };
        if intent.status == PaymentIntentStatus::Settled {
            release(&self.used_tx_refs);
            return Err(SettlementError::DuplicateTxRef);
        }
        if intent.status == PaymentIntentStatus::Expired || intent.expired(now_ms) {
            intent.status = PaymentIntentStatus::Expired;
            release(&self.used_tx_refs);
            return Err(SettlementError::IntentExpired(intent_id.to_string()));
        }

        intent.status = PaymentIntentStatus::Settled;
        intent.tx_ref = Some(tx_ref.to_string());
        Ok(intent.credits)
    }

    /// Expire overdue intents (reconcile loop). Returns how many flipped.
    pub fn reconcile(&self, now_ms: u64) -> usize {
        let mut expired = 0;
        for mut intent in self.intents.iter_mut() {
            if intent.status == PaymentIntentStatus::Created && intent.expired(now_ms) {
                intent.status = PaymentIntentStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    /// Number of intents tracked.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// True when no intents exist.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
