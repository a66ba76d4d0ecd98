//! Prometheus metrics for the settlement gateway

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};

lazy_static! {
    /// Inbound payloads by receiving bank and final status
    pub static ref SETTLEMENT_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "settlement_received_total",
        "Payloads received from peer banks",
        &["bank", "status"]
    )
    .unwrap();

    /// Outbound deliveries by sending bank and outcome
    pub static ref SETTLEMENT_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "settlement_deliveries_total",
        "Deliveries to peer banks",
        &["bank", "outcome"]
    )
    .unwrap();

    /// Payloads parked for redelivery
    pub static ref SETTLEMENT_OUTBOX_PENDING: IntGaugeVec = register_int_gauge_vec!(
        "settlement_outbox_pending",
        "Payloads waiting for redelivery",
        &["bank"]
    )
    .unwrap();
}
