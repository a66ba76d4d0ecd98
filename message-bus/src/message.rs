//! Reply side of a request

use crate::types::ServiceKind;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Reply channel handed to a service together with a request.
///
/// Every request carries exactly one `Responder`; answering consumes it,
/// so a service can never reply twice to the same request.
#[derive(Debug)]
pub struct Responder<R> {
    request_id: Uuid,
    service: ServiceKind,
    received_at: DateTime<Utc>,
    sender: oneshot::Sender<R>,
}

impl<R> Responder<R> {
    pub(crate) fn new(service: ServiceKind, sender: oneshot::Sender<R>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            service,
            received_at: Utc::now(),
            sender,
        }
    }

    /// Request ID (UUIDv7, for tracing)
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Time the request was created
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Whether the requester is still waiting
    pub fn is_waiting(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Send the reply
    ///
    /// Returns `false` when the requester gave up (timeout or dropped).
    pub fn respond(self, reply: R) -> bool {
        let delivered = self.sender.send(reply).is_ok();
        if !delivered {
            tracing::debug!(
                service = %self.service,
                request_id = %self.request_id,
                "Requester went away before reply"
            );
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_respond_delivers() {
        let (tx, rx) = oneshot::channel();
        let responder = Responder::new(ServiceKind::Ledger, tx);
        assert!(responder.is_waiting());
        assert!(responder.respond(42u32));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_respond_after_requester_dropped() {
        let (tx, rx) = oneshot::channel::<u32>();
        let responder = Responder::new(ServiceKind::Router, tx);
        drop(rx);
        assert!(!responder.is_waiting());
        assert!(!responder.respond(7));
    }
}
