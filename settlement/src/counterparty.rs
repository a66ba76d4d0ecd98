//! Counterparty banks and address resolution
//!
//! How a peer bank is reached (HTTP, MQ, another in-process node) is not
//! this crate's concern; the gateway only needs something that accepts a
//! payload and answers with a [`SettlementResult`].

use crate::{
    types::{ExternalPayload, SettlementResult},
    Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Settlement endpoint of a peer bank
///
/// Implementations must be idempotent by transaction ID: the gateway
/// resends the same payload after a timeout.
#[async_trait]
pub trait CounterpartyBank: Send + Sync {
    /// Deliver a payload and wait for the peer's final status
    async fn settle(&self, payload: ExternalPayload) -> Result<SettlementResult>;
}

/// Resolves a bank code to its settlement endpoint
pub trait CounterpartyDirectory: Send + Sync {
    /// Endpoint for a bank, if known
    fn resolve(&self, bank_code: &str) -> Option<Arc<dyn CounterpartyBank>>;
}

/// Directory backed by an in-memory table
#[derive(Default)]
pub struct StaticDirectory {
    banks: RwLock<HashMap<String, Arc<dyn CounterpartyBank>>>,
}

impl std::fmt::Debug for StaticDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<String> = self.banks.read().keys().cloned().collect();
        codes.sort();
        f.debug_struct("StaticDirectory").field("banks", &codes).finish()
    }
}

impl StaticDirectory {
    /// Create empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a bank's endpoint
    pub fn register(&self, bank_code: impl Into<String>, bank: Arc<dyn CounterpartyBank>) {
        let bank_code = bank_code.into();
        tracing::info!(bank = %bank_code, "Counterparty registered");
        self.banks.write().insert(bank_code, bank);
    }

    /// Remove a bank's endpoint
    pub fn remove(&self, bank_code: &str) -> bool {
        self.banks.write().remove(bank_code).is_some()
    }

    /// Number of known banks
    pub fn len(&self) -> usize {
        self.banks.read().len()
    }

    /// Whether no bank is known
    pub fn is_empty(&self) -> bool {
        self.banks.read().is_empty()
    }
}

impl CounterpartyDirectory for StaticDirectory {
    fn resolve(&self, bank_code: &str) -> Option<Arc<dyn CounterpartyBank>> {
        self.banks.read().get(bank_code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::StatusCode;

    struct AlwaysSettles;

    #[async_trait]
    impl CounterpartyBank for AlwaysSettles {
        async fn settle(&self, payload: ExternalPayload) -> Result<SettlementResult> {
            Ok(SettlementResult::new(payload.transaction_id, StatusCode::Settled))
        }
    }

    #[test]
    fn test_register_resolve_remove() {
        let directory = StaticDirectory::new();
        assert!(directory.is_empty());
        assert!(directory.resolve("OTHR").is_none());

        directory.register("OTHR", Arc::new(AlwaysSettles));
        assert_eq!(directory.len(), 1);
        assert!(directory.resolve("OTHR").is_some());
        assert!(directory.resolve("ELSE").is_none());

        assert!(directory.remove("OTHR"));
        assert!(!directory.remove("OTHR"));
        assert!(directory.resolve("OTHR").is_none());
    }
}
