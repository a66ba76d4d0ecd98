//! Error types for the transaction router
//!
//! Every waiter on a coalesced submission receives a copy of the same
//! result, so errors here are `Clone` and carry lower-level failures as
//! text.

use thiserror::Error;
use uuid::Uuid;

/// Result type for router operations
pub type Result<T> = std::result::Result<T, Error>;

/// Router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Ledger did not answer after every re-query; outcome unknown to the router
    #[error("Ledger unavailable for transaction {transaction_id}: {reason}")]
    LedgerUnavailable {
        /// Transaction ID
        transaction_id: Uuid,
        /// Last transport failure
        reason: String,
    },

    /// Ledger infrastructure failure
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Settlement gateway failure
    #[error("Settlement error: {0}")]
    Settlement(String),

    /// Router service unreachable
    #[error("Router service: {0}")]
    Bus(#[from] message_bus::Error),

    /// Router is draining and takes no new submissions
    #[error("Router is shutting down")]
    ShuttingDown,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Transport-class failure (the only retryable class)
    pub fn is_transport(&self) -> bool {
        match self {
            Error::LedgerUnavailable { .. } => true,
            Error::Bus(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<ledger_core::Error> for Error {
    fn from(err: ledger_core::Error) -> Self {
        Error::Ledger(err.to_string())
    }
}

impl From<settlement::Error> for Error {
    fn from(err: settlement::Error) -> Self {
        Error::Settlement(err.to_string())
    }
}
