//! Redelivery outbox
//!
//! Holds outbound payloads whose counterparty could not be reached, and
//! remembers confirmations of delivered ones. A transaction ID is in at
//! most one of the two sets. The confirmation cache is bounded; once full
//! the oldest IDs are forgotten first.

use crate::types::{ExternalPayload, PendingDelivery, SettlementResult};
use chrono::Utc;
use ledger_core::TransactionId;
use std::collections::BTreeMap;

const DEFAULT_DELIVERED_CAPACITY: usize = 10_000;

/// Outbound delivery bookkeeping
#[derive(Debug)]
pub struct Outbox {
    /// Parked payloads (UUIDv7 keys, so oldest first)
    pending: BTreeMap<TransactionId, PendingDelivery>,

    /// Confirmations received from counterparties, oldest first
    delivered: BTreeMap<TransactionId, SettlementResult>,

    /// Most confirmations kept in `delivered`
    delivered_capacity: usize,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::with_delivered_capacity(DEFAULT_DELIVERED_CAPACITY)
    }
}

impl Outbox {
    /// Create empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty outbox remembering at most `capacity` confirmations
    pub fn with_delivered_capacity(capacity: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            delivered: BTreeMap::new(),
            delivered_capacity: capacity.max(1),
        }
    }

    /// Park a payload after a failed delivery run
    pub fn park(&mut self, payload: ExternalPayload, bank_code: &str, error: String) {
        if self.delivered.contains_key(&payload.transaction_id) {
            return;
        }

        self.pending
            .entry(payload.transaction_id)
            .and_modify(|entry| {
                entry.attempts += 1;
                entry.last_error = error.clone();
            })
            .or_insert_with(|| PendingDelivery {
                payload,
                bank_code: bank_code.to_string(),
                attempts: 1,
                parked_at: Utc::now(),
                last_error: error,
            });
    }

    /// Record a counterparty confirmation
    pub fn mark_delivered(&mut self, result: SettlementResult) {
        self.pending.remove(&result.transaction_id);
        self.delivered.insert(result.transaction_id, result);
        while self.delivered.len() > self.delivered_capacity {
            if let Some((evicted, _)) = self.delivered.pop_first() {
                tracing::debug!(transaction_id = %evicted, "Dropped oldest delivery confirmation");
            }
        }
    }

    /// Number of remembered confirmations
    pub fn delivered_len(&self) -> usize {
        self.delivered.len()
    }

    /// Cached confirmation for a delivered transaction
    pub fn delivered(&self, transaction_id: &TransactionId) -> Option<SettlementResult> {
        self.delivered.get(transaction_id).copied()
    }

    /// Whether a transaction is parked
    pub fn is_pending(&self, transaction_id: &TransactionId) -> bool {
        self.pending.contains_key(transaction_id)
    }

    /// Snapshot of parked payloads, oldest first
    pub fn pending(&self) -> Vec<PendingDelivery> {
        self.pending.values().cloned().collect()
    }

    /// Number of parked payloads
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
