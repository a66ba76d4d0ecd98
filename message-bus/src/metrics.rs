//! Prometheus metrics for message bus

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    /// Total requests by target service and outcome
    pub static ref BUS_REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_requests_total",
        "Total requests sent through the bus",
        &["service", "outcome"]
    )
    .unwrap();

    /// Request round-trip duration
    pub static ref BUS_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_request_duration_seconds",
        "Request round-trip duration in seconds",
        &["service"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0]
    )
    .unwrap();

    /// Retry attempts by operation
    pub static ref BUS_RETRY_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_retries_total",
        "Retry attempts after a transient failure",
        &["operation"]
    )
    .unwrap();
}
