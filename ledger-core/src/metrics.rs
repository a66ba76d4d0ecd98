//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_transactions_total{status}` - Final determinations by status code
//! - `ledger_replays_total` - Replays answered from the stored result
//! - `ledger_apply_duration_seconds` - Histogram of verify-and-apply latencies
//! - `ledger_accounts_opened_total` - Accounts opened

use crate::types::StatusCode;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Registered on its own registry so several ledgers can live in one process.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Final determinations by status
    pub transactions_total: IntCounterVec,

    /// Idempotent replays
    pub replays_total: IntCounter,

    /// Verify-and-apply duration histogram
    pub apply_duration: Histogram,

    /// Accounts opened
    pub accounts_opened: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "ledger_transactions_total",
                "Final ledger determinations by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let replays_total = IntCounter::new(
            "ledger_replays_total",
            "Replays answered from the stored result",
        )?;
        registry.register(Box::new(replays_total.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_apply_duration_seconds",
                "Histogram of verify-and-apply latencies",
            )
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let accounts_opened = IntCounter::new(
            "ledger_accounts_opened_total",
            "Total number of accounts opened",
        )?;
        registry.register(Box::new(accounts_opened.clone()))?;

        Ok(Self {
            transactions_total,
            replays_total,
            apply_duration,
            accounts_opened,
            registry,
        })
    }

    /// Record a final determination
    pub fn record_outcome(&self, status: StatusCode) {
        self.transactions_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Record a replay
    pub fn record_replay(&self) {
        self.replays_total.inc();
    }

    /// Record verify-and-apply duration
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Record account opening
    pub fn record_account_opened(&self) {
        self.accounts_opened.inc();
    }

    /// Count for one status
    pub fn outcome_count(&self, status: StatusCode) -> u64 {
        self.transactions_total
            .with_label_values(&[status.as_str()])
            .get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
