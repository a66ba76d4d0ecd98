//! Type definitions for message bus

use serde::{Deserialize, Serialize};
use std::fmt;

/// Services reachable through the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Account ledger
    Ledger,
    /// Transaction request router
    Router,
    /// External settlement gateway
    Settlement,
}

impl ServiceKind {
    /// Stable name used for metric labels and log fields
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Ledger => "ledger",
            ServiceKind::Router => "router",
            ServiceKind::Settlement => "settlement",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
