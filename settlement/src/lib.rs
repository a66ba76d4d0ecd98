//! Settlement Gateway
//!
//! Connects a bank's ledger to its peer banks.
//!
//! # Architecture
//!
//! ```text
//!   peer bank ──payload──▶ GatewayHandle::receive ──▶ validator ──▶ LedgerHandle
//!       ▲                                                              │
//!       └──────────── SettlementResult (id + status) ◀─────────────────┘
//!
//!   router ──settled record──▶ GatewayHandle::deliver ──▶ CounterpartyDirectory
//!                                      │                          │
//!                                      │ retries exhausted        ▼
//!                                      └──────▶ Outbox ──▶ CounterpartyBank::settle
//! ```
//!
//! Inbound payloads are answered with the ledger's final status; resends
//! with the same transaction ID get the same answer. Outbound payloads that
//! cannot reach their bank are parked and redelivered under the same ID.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{spawn_gateway, Config, StaticDirectory};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let (ledger, _) = ledger_core::spawn_ledger(&ledger_core::Config::default())?;
//!     let directory = Arc::new(StaticDirectory::new());
//!     let gateway = spawn_gateway(
//!         ledger_core::BankIdentity::default(),
//!         ledger,
//!         directory,
//!         Config::default(),
//!     );
//!
//!     let result = gateway.receive_json(br#"{"transaction_id": "bad"}"#.to_vec()).await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod counterparty;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod outbox;
pub mod types;
pub mod validator;

// Re-exports
pub use config::Config;
pub use counterparty::{CounterpartyBank, CounterpartyDirectory, StaticDirectory};
pub use error::{Error, Result};
pub use gateway::{spawn_gateway, GatewayHandle, GatewayMessage, SettlementGateway};
pub use outbox::Outbox;
pub use types::*;
pub use validator::{PayloadValidator, ValidationResult};
