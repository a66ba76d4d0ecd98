//! Transaction Router and bank node
//!
//! Front door of a bank. Customer intents (transfers, cash deposits and
//! withdrawals) are checked, turned into transaction records and sent to
//! the ledger; settled transfers to other banks continue to the settlement
//! gateway.
//!
//! # Architecture
//!
//! ```text
//!   PIN / UI / API ──▶ RouterHandle ──▶ LedgerHandle ──▶ AccountLedger
//!                           │
//!                           └──(foreign, settled)──▶ GatewayHandle ──▶ peer bank
//! ```
//!
//! Every submission ends in exactly one reply: a [`SubmitReply`] carrying
//! the transaction's final status, or [`Error::LedgerUnavailable`] when the
//! ledger could not be reached at all.
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use transaction_router::{BankNode, Config};
//!
//! #[tokio::main]
//! async fn main() -> transaction_router::Result<()> {
//!     let node = BankNode::start(Config::default())?;
//!     let account = node.ledger().open_account("J. Jansen").await?;
//!
//!     let reply = node
//!         .submit_transaction(
//!             account.account_number.as_str(),
//!             "NL02BANK0000000002",
//!             "P. de Vries",
//!             Decimal::from(10),
//!             "Dinner",
//!         )
//!         .await?;
//!     println!("{} {}", reply.transaction_id, reply.status);
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
pub mod error;
pub mod intent;
pub mod metrics;
pub mod node;
pub mod router;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use intent::{SubmitReply, SubmitRequest, TransactionIntent};
pub use node::BankNode;
pub use router::{spawn_router, RouterHandle, RouterMessage, TransactionRouter};
