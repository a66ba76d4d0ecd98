//! Error types for the ledger
//!
//! Business refusals (unknown account, insufficient funds, limit exceeded)
//! are not errors: they are recorded on the `TransactionRecord`. These
//! variants cover infrastructure and API misuse only.

use crate::types::TransactionState;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (memory store or RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Record cannot move to the requested state
    #[error("Invalid transition for {transaction_id}: {from} -> {to}")]
    InvalidTransition {
        /// Transaction ID
        transaction_id: Uuid,
        /// Current state
        from: TransactionState,
        /// Requested state
        to: TransactionState,
    },

    /// Record handed to the ledger in an unusable shape
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account number already issued
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Account still holds money
    #[error("Account balance must be zero to close: {0}")]
    AccountNotEmpty(String),

    /// Account is closed
    #[error("Account closed: {0}")]
    AccountClosed(String),

    /// Account number is not well formed
    #[error("Invalid account number: {0}")]
    InvalidAccountNumber(String),

    /// Transfer limit or overdraft allowance is negative
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Ledger service unreachable (mailbox closed, timeout, ...)
    #[error("Ledger service: {0}")]
    Bus(#[from] message_bus::Error),

    /// Concurrency error (worker panicked, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport-class failure (the only retryable class)
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Bus(e) if e.is_transient())
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
