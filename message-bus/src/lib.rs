//! In-process message bus
//!
//! Provides typed request/reply messaging between services:
//! - Bounded mailboxes per service (backpressure)
//! - One reply channel per request, no broadcast
//! - Timeouts on the requester side
//! - Retry logic with exponential backoff
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod message;
pub mod metrics;
pub mod retry;
pub mod types;

pub use client::{mailbox, Mailbox, ServiceClient};
pub use error::{Error, Result};
pub use message::Responder;
pub use retry::RetryPolicy;
pub use types::ServiceKind;
