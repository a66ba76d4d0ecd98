//! Service mailboxes and request clients
//!
//! Each service owns one [`Mailbox`]; every other component talks to it
//! through a cloneable [`ServiceClient`]. A request is built around a
//! fresh [`Responder`] so the reply travels on its own oneshot channel.

use crate::{
    metrics::{BUS_REQUEST_DURATION, BUS_REQUEST_TOTAL},
    Error, Responder, Result, ServiceKind,
};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Create a bounded mailbox for a service
pub fn mailbox<M>(service: ServiceKind, capacity: usize) -> (ServiceClient<M>, Mailbox<M>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        ServiceClient { service, sender },
        Mailbox { service, receiver },
    )
}

/// Receiving end owned by the service task
#[derive(Debug)]
pub struct Mailbox<M> {
    service: ServiceKind,
    receiver: mpsc::Receiver<M>,
}

impl<M> Mailbox<M> {
    /// Receive the next message; `None` once every client is dropped
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Stop accepting new messages (already queued ones can still be drained)
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Owning service
    pub fn service(&self) -> ServiceKind {
        self.service
    }
}

/// Sending end, cheap to clone
#[derive(Debug)]
pub struct ServiceClient<M> {
    service: ServiceKind,
    sender: mpsc::Sender<M>,
}

impl<M> Clone for ServiceClient<M> {
    fn clone(&self) -> Self {
        Self {
            service: self.service,
            sender: self.sender.clone(),
        }
    }
}

impl<M> ServiceClient<M> {
    /// Target service
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Whether the service has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Post a message without waiting for a reply
    pub async fn send(&self, message: M) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| Error::Closed(self.service))
    }

    /// Send a request and wait for its reply
    ///
    /// `build` receives the reply channel and returns the message to enqueue.
    pub async fn request<R>(&self, build: impl FnOnce(Responder<R>) -> M) -> Result<R> {
        let start = Instant::now();
        let (tx, rx) = oneshot::channel();
        let message = build(Responder::new(self.service, tx));

        let result = match self.sender.send(message).await {
            Ok(()) => rx.await.map_err(|_| Error::NoReply(self.service)),
            Err(_) => Err(Error::Closed(self.service)),
        };

        self.record(&result, start);
        result
    }

    /// Send a request and wait at most `timeout` for its reply
    ///
    /// On timeout the request may still be processed by the service; the
    /// caller must re-query through an idempotent path rather than resend
    /// a fresh mutation.
    pub async fn request_timeout<R>(
        &self,
        timeout: Duration,
        build: impl FnOnce(Responder<R>) -> M,
    ) -> Result<R> {
        match tokio::time::timeout(timeout, self.request(build)).await {
            Ok(result) => result,
            Err(_) => {
                BUS_REQUEST_TOTAL
                    .with_label_values(&[self.service.name(), "timeout"])
                    .inc();
                Err(Error::Timeout {
                    service: self.service,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn record<R>(&self, result: &Result<R>, start: Instant) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(Error::Closed(_)) => "closed",
            Err(Error::NoReply(_)) => "no_reply",
            Err(Error::Timeout { .. }) => "timeout",
        };
        BUS_REQUEST_TOTAL
            .with_label_values(&[self.service.name(), outcome])
            .inc();
        BUS_REQUEST_DURATION
            .with_label_values(&[self.service.name()])
            .observe(start.elapsed().as_secs_f64());
    }
}
