//! Error types for the settlement gateway
//!
//! A malformed or refused payload is not an error: it is answered with a
//! [`SettlementResult`](crate::SettlementResult) carrying the status code.

use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Gateway service unreachable
    #[error("Settlement service: {0}")]
    Bus(#[from] message_bus::Error),

    /// Counterparty bank answered with a failure
    #[error("Counterparty {bank_code} failed: {reason}")]
    Counterparty {
        /// Counterparty bank code
        bank_code: String,
        /// Failure description
        reason: String,
    },

    /// Counterparty bank did not answer in time
    #[error("Counterparty {bank_code} timed out after {timeout_ms}ms")]
    CounterpartyTimeout {
        /// Counterparty bank code
        bank_code: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Record cannot be delivered (not settled, or destination is local)
    #[error("Transaction {0} is not deliverable")]
    NotDeliverable(Uuid),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport-class failure (the only retryable class)
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Counterparty { .. } | Error::CounterpartyTimeout { .. } => true,
            Error::Bus(e) => e.is_transient() || matches!(e, message_bus::Error::Closed(_)),
            Error::Ledger(e) => e.is_transport(),
            _ => false,
        }
    }
}
