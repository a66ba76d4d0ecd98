//! Error types for message bus

use crate::types::ServiceKind;
use thiserror::Error;

/// Message bus error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Service mailbox closed (service stopped)
    #[error("Mailbox closed: {0}")]
    Closed(ServiceKind),

    /// Service dropped the reply channel without answering
    #[error("No reply from {0}")]
    NoReply(ServiceKind),

    /// Reply did not arrive in time
    #[error("Request to {service} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target service
        service: ServiceKind,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },
}

impl Error {
    /// Whether the request may be retried through an idempotent path
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
