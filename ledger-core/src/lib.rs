//! Ledger Core
//!
//! Authoritative store of account balances for one bank.
//!
//! # Architecture
//!
//! - **Single owner**: only the ledger mutates balances; everything else asks
//! - **Striped locks**: transactions on disjoint accounts run in parallel
//! - **Atomic commit**: record, balances and history land in one write batch
//! - **Idempotent**: a transaction ID is applied at most once
//!
//! # Invariants
//!
//! - No account balance ever goes below its floor
//! - Money moves only through settled transactions
//! - A processed record never changes state again
//! - Replays return the stored result, not a fresh evaluation

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger, spawn_ledger_actor, LedgerActor, LedgerHandle, LedgerMessage};
pub use config::{Config, StorageBackend};
pub use error::{Error, Result};
pub use ledger::{AccountLedger, OpenAccountRequest};
pub use metrics::Metrics;
pub use storage::{MemoryStore, Store};
pub use types::{
    Account, AccountNumber, AccountStatus, BankIdentity, FailureKind, Party, StatusCode,
    TransactionId, TransactionOrigin, TransactionRecord, TransactionState, CASH_ACCOUNT,
};
