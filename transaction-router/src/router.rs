//! Transaction request router
//!
//! Takes customer intents, hands them to the ledger and, for settled
//! transfers to peer banks, to the settlement gateway:
//!
//! ```text
//!   front-end ──SubmitRequest──▶ TransactionRouter ──record──▶ LedgerHandle
//!                                      ▲                           │
//!                                      └──── on_ledger_result ◀────┘
//!                                      │
//!                     foreign + settled└──▶ GatewayHandle::deliver
//! ```
//!
//! The actor only keeps bookkeeping: which transaction IDs are in flight
//! and who is waiting for them. Ledger and gateway calls run in their own
//! tasks and report back through a continuation channel, so a slow
//! transaction never holds up unrelated ones.

use crate::{
    config::Config,
    intent::{SubmitReply, SubmitRequest, TransactionIntent},
    metrics::{ROUTER_COALESCED_TOTAL, ROUTER_LEDGER_REQUERY_TOTAL, ROUTER_SUBMISSIONS_TOTAL},
    Error, Result,
};
use ledger_core::{BankIdentity, LedgerHandle, Party, StatusCode, TransactionId, TransactionRecord};
use message_bus::{Mailbox, Responder, ServiceClient, ServiceKind};
use rust_decimal::Decimal;
use settlement::GatewayHandle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Message sent to the router
#[derive(Debug)]
pub enum RouterMessage {
    /// Submit a customer transaction
    Submit {
        request: SubmitRequest,
        response: Responder<Result<SubmitReply>>,
    },

    /// Number of transactions awaiting a terminal outcome
    InFlight { response: Responder<usize> },

    /// Stop accepting messages; in-flight transactions still finish
    Shutdown,
}

/// Replies from ledger and gateway tasks
#[derive(Debug)]
enum Continuation {
    Ledger {
        transaction_id: TransactionId,
        result: Result<TransactionRecord>,
    },
    Delivery {
        transaction_id: TransactionId,
        result: Result<SubmitReply>,
    },
}

/// Router service task
#[derive(Debug)]
pub struct TransactionRouter {
    bank: BankIdentity,
    ledger: LedgerHandle,
    gateway: GatewayHandle,
    ledger_timeout: Duration,
    ledger_retries: u32,
    mailbox: Mailbox<RouterMessage>,
    continuations: mpsc::UnboundedReceiver<Continuation>,
    continuation_tx: mpsc::UnboundedSender<Continuation>,
    in_flight: HashMap<TransactionId, Vec<Responder<Result<SubmitReply>>>>,
}

impl TransactionRouter {
    /// Create router for `bank`
    pub fn new(
        bank: BankIdentity,
        ledger: LedgerHandle,
        gateway: GatewayHandle,
        config: &Config,
        mailbox: Mailbox<RouterMessage>,
    ) -> Self {
        let (continuation_tx, continuations) = mpsc::unbounded_channel();
        Self {
            bank,
            ledger,
            gateway,
            ledger_timeout: config.ledger_timeout(),
            ledger_retries: config.ledger_retries,
            mailbox,
            continuations,
            continuation_tx,
            in_flight: HashMap::new(),
        }
    }

    /// Run the router event loop
    pub async fn run(mut self) {
        tracing::info!(bank = %self.bank.bank_code, "Transaction router started");
        let mut mailbox_done = false;

        loop {
            if mailbox_done && self.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                msg = self.mailbox.recv(), if !mailbox_done => match msg {
                    Some(RouterMessage::Shutdown) => {
                        // Queued submissions are still answered
                        self.mailbox.close();
                    }
                    Some(RouterMessage::Submit { request, response }) => {
                        self.submit(request, response);
                    }
                    Some(RouterMessage::InFlight { response }) => {
                        response.respond(self.in_flight.len());
                    }
                    None => mailbox_done = true,
                },

                Some(continuation) = self.continuations.recv() => match continuation {
                    Continuation::Ledger { transaction_id, result } => {
                        self.on_ledger_result(transaction_id, result);
                    }
                    Continuation::Delivery { transaction_id, result } => {
                        self.finish(transaction_id, result);
                    }
                },
            }
        }

        tracing::info!(bank = %self.bank.bank_code, "Transaction router stopped");
    }

    fn submit(&mut self, request: SubmitRequest, response: Responder<Result<SubmitReply>>) {
        let transaction_id = request.transaction_id.unwrap_or_else(Uuid::now_v7);

        if let Err(reason) = request.intent.validate(&self.bank) {
            tracing::warn!(
                transaction_id = %transaction_id,
                reason = %reason,
                "Malformed submission"
            );
            let reply = SubmitReply::new(transaction_id, StatusCode::MalformedTransaction);
            self.count(&Ok(reply));
            response.respond(Ok(reply));
            return;
        }

        if let Some(waiters) = self.in_flight.get_mut(&transaction_id) {
            tracing::debug!(transaction_id = %transaction_id, "Joined in-flight submission");
            ROUTER_COALESCED_TOTAL.inc();
            waiters.push(response);
            return;
        }
        self.in_flight.insert(transaction_id, vec![response]);

        let record = request.intent.to_record(transaction_id);
        tracing::debug!(
            transaction_id = %transaction_id,
            source = %record.source_account_number,
            destination = %record.destination_account_number,
            amount = %record.amount,
            "Forwarding to ledger"
        );

        let ledger = self.ledger.clone();
        let continuations = self.continuation_tx.clone();
        let timeout = self.ledger_timeout;
        let retries = self.ledger_retries;
        tokio::spawn(async move {
            let result = verify_with_requery(&ledger, record, timeout, retries).await;
            // Receiver lives as long as the router loop
            let _ = continuations.send(Continuation::Ledger {
                transaction_id,
                result,
            });
        });
    }

    fn on_ledger_result(&mut self, transaction_id: TransactionId, result: Result<TransactionRecord>) {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                self.finish(transaction_id, Err(e));
                return;
            }
        };

        match self.bank.classify(&record.destination_account_number) {
            Party::Foreign { bank_code } if record.successful() => {
                tracing::debug!(
                    transaction_id = %transaction_id,
                    bank = %bank_code,
                    "Settled locally, delivering to counterparty"
                );
                let gateway = self.gateway.clone();
                let continuations = self.continuation_tx.clone();
                tokio::spawn(async move {
                    let result = gateway
                        .deliver(record)
                        .await
                        .map(|result| SubmitReply::new(result.transaction_id, result.status))
                        .map_err(Error::from);
                    let _ = continuations.send(Continuation::Delivery {
                        transaction_id,
                        result,
                    });
                });
            }
            _ => self.finish(transaction_id, Ok(SubmitReply::from_record(&record))),
        }
    }

    /// Answer every waiter for a transaction with the same terminal result
    fn finish(&mut self, transaction_id: TransactionId, result: Result<SubmitReply>) {
        let waiters = self.in_flight.remove(&transaction_id).unwrap_or_default();

        match &result {
            Ok(reply) => tracing::info!(
                transaction_id = %transaction_id,
                status = %reply.status,
                waiters = waiters.len(),
                "Transaction finished"
            ),
            Err(e) => tracing::error!(
                transaction_id = %transaction_id,
                error = %e,
                waiters = waiters.len(),
                "Transaction failed"
            ),
        }
        self.count(&result);

        for waiter in waiters {
            waiter.respond(result.clone());
        }
    }

    fn count(&self, result: &Result<SubmitReply>) {
        let status = match result {
            Ok(reply) => reply.status.as_str(),
            Err(_) => "ERROR",
        };
        ROUTER_SUBMISSIONS_TOTAL
            .with_label_values(&[self.bank.bank_code.as_str(), status])
            .inc();
    }
}

/// Verify and apply with bounded waits.
///
/// A timed-out call may still have been committed, so before every resend
/// the ledger is asked for the stored result. Only when it has none is the
/// same record (same ID) sent again.
async fn verify_with_requery(
    ledger: &LedgerHandle,
    record: TransactionRecord,
    timeout: Duration,
    retries: u32,
) -> Result<TransactionRecord> {
    let transaction_id = record.transaction_id;
    let mut failures = 0u32;

    loop {
        let reason = match ledger.verify_and_apply_timeout(record.clone(), timeout).await {
            Ok(processed) => return Ok(processed),
            Err(ledger_core::Error::Bus(e)) => e.to_string(),
            Err(e) => return Err(e.into()),
        };

        failures += 1;
        ROUTER_LEDGER_REQUERY_TOTAL.inc();
        tracing::warn!(
            transaction_id = %transaction_id,
            attempt = failures,
            reason = %reason,
            "No ledger reply, re-querying"
        );

        match ledger.get_transaction_timeout(transaction_id, timeout).await {
            Ok(Some(stored)) if stored.processed() => return Ok(stored),
            Ok(_) => {}
            Err(ledger_core::Error::Bus(e)) => {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "Re-query failed");
            }
            Err(e) => return Err(e.into()),
        }

        if failures > retries {
            return Err(Error::LedgerUnavailable {
                transaction_id,
                reason,
            });
        }
    }
}

/// Handle for sending messages to the router
#[derive(Clone, Debug)]
pub struct RouterHandle {
    client: ServiceClient<RouterMessage>,
}

impl RouterHandle {
    /// Wrap a bus client
    pub fn new(client: ServiceClient<RouterMessage>) -> Self {
        Self { client }
    }

    /// Whether the router has stopped
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Submit a request and wait for its terminal outcome
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReply> {
        self.client
            .request(|response| RouterMessage::Submit { request, response })
            .await?
    }

    /// Submit a transfer under a router-assigned ID
    pub async fn submit_transaction(
        &self,
        source_account: impl Into<String>,
        destination_account: impl Into<String>,
        destination_holder_name: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<SubmitReply> {
        let intent = TransactionIntent::transfer(
            source_account,
            destination_account,
            destination_holder_name,
            amount,
            description,
        );
        self.submit(SubmitRequest::new(intent)).await
    }

    /// Number of transactions awaiting a terminal outcome
    pub async fn in_flight(&self) -> Result<usize> {
        Ok(self
            .client
            .request(|response| RouterMessage::InFlight { response })
            .await?)
    }

    /// Shutdown router
    pub async fn shutdown(&self) -> Result<()> {
        self.client.send(RouterMessage::Shutdown).await?;
        Ok(())
    }
}

/// Spawn the router service
pub fn spawn_router(
    bank: BankIdentity,
    ledger: LedgerHandle,
    gateway: GatewayHandle,
    config: &Config,
) -> RouterHandle {
    let (client, mailbox) = message_bus::mailbox(ServiceKind::Router, config.mailbox_capacity);
    let router = TransactionRouter::new(bank, ledger, gateway, config, mailbox);

    tokio::spawn(async move {
        router.run().await;
    });

    RouterHandle::new(client)
}
