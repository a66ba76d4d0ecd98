//! Prometheus metrics for the transaction router

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    /// Terminal replies by bank and status
    pub static ref ROUTER_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "router_submissions_total",
        "Submissions answered by the router",
        &["bank", "status"]
    )
    .unwrap();

    /// Submissions that joined one already in flight
    pub static ref ROUTER_COALESCED_TOTAL: IntCounter = register_int_counter!(
        "router_coalesced_total",
        "Duplicate submissions folded into an in-flight one"
    )
    .unwrap();

    /// Re-queries after a ledger timeout
    pub static ref ROUTER_LEDGER_REQUERY_TOTAL: IntCounter = register_int_counter!(
        "router_ledger_requery_total",
        "Ledger lookups after a timed-out verification"
    )
    .unwrap();
}
