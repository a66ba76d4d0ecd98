//! External settlement gateway
//!
//! Two directions:
//!
//! - **Receive**: payloads from peer banks are validated, turned into
//!   ledger records (credit-only or debit-only) and answered with the
//!   ledger's final status. Resends are safe: the ledger answers a known
//!   transaction ID from its stored result.
//! - **Deliver**: records settled here whose destination is held at a peer
//!   bank are sent to that bank. Transport failures are retried with the
//!   same payload; when retries run out the payload is parked in the
//!   outbox and redelivered later. A peer refusal is refunded to the
//!   source account under a derived transaction ID.

use crate::{
    config::Config,
    counterparty::{CounterpartyBank, CounterpartyDirectory},
    metrics::{SETTLEMENT_DELIVERIES_TOTAL, SETTLEMENT_OUTBOX_PENDING, SETTLEMENT_RECEIVED_TOTAL},
    outbox::Outbox,
    types::{reversal_id, ExternalPayload, PendingDelivery, RedeliveryReport, SettlementResult},
    validator::PayloadValidator,
    Error, Result,
};
use async_trait::async_trait;
use ledger_core::{
    BankIdentity, LedgerHandle, Party, StatusCode, TransactionOrigin, TransactionRecord,
};
use message_bus::{Mailbox, Responder, ServiceClient, ServiceKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Message sent to the gateway
#[derive(Debug)]
pub enum GatewayMessage {
    /// Inbound payload from a peer bank
    Receive {
        payload: ExternalPayload,
        response: Responder<Result<SettlementResult>>,
    },

    /// Inbound payload as JSON bytes
    ReceiveJson {
        bytes: Vec<u8>,
        response: Responder<Result<SettlementResult>>,
    },

    /// Deliver a settled record to its destination bank
    Deliver {
        record: TransactionRecord,
        response: Responder<Result<SettlementResult>>,
    },

    /// Retry every parked payload now
    RedeliverPending {
        response: Responder<Result<RedeliveryReport>>,
    },

    /// Snapshot of parked payloads
    Pending {
        response: Responder<Vec<PendingDelivery>>,
    },

    /// Stop accepting messages; queued ones are still answered
    Shutdown,
}

/// State shared by every gateway task
struct GatewayCore {
    bank: BankIdentity,
    ledger: LedgerHandle,
    directory: Arc<dyn CounterpartyDirectory>,
    validator: PayloadValidator,
    outbox: Mutex<Outbox>,
    redelivering: AtomicBool,
    config: Config,
}

impl GatewayCore {
    async fn receive(&self, payload: ExternalPayload) -> Result<SettlementResult> {
        let transaction_id = payload.transaction_id;

        let validation = self.validator.validate(&payload);
        if !validation.is_valid() {
            tracing::warn!(
                transaction_id = %transaction_id,
                sending_bank = %payload.sending_bank,
                errors = ?validation.codes(),
                "Malformed payload"
            );
            let result = SettlementResult::malformed(transaction_id);
            self.record_received(&result);
            return Ok(result);
        }

        let record = self.apply(payload.to_record()).await?;
        let result = SettlementResult::from_record(&record);

        tracing::info!(
            transaction_id = %transaction_id,
            sending_bank = %payload.sending_bank,
            direction = ?payload.direction,
            status = %result.status,
            "External transaction processed"
        );
        self.record_received(&result);
        Ok(result)
    }

    async fn receive_json(&self, bytes: &[u8]) -> Result<SettlementResult> {
        match serde_json::from_slice::<ExternalPayload>(bytes) {
            Ok(payload) => self.receive(payload).await,
            Err(e) => {
                let transaction_id = salvage_transaction_id(bytes);
                tracing::warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Undecodable payload"
                );
                let result = SettlementResult::malformed(transaction_id);
                self.record_received(&result);
                Ok(result)
            }
        }
    }

    async fn deliver(&self, record: TransactionRecord) -> Result<SettlementResult> {
        let transaction_id = record.transaction_id;

        let bank_code = match self.bank.classify(&record.destination_account_number) {
            Party::Foreign { bank_code } if record.successful() => bank_code,
            _ => return Err(Error::NotDeliverable(transaction_id)),
        };

        {
            let outbox = self.outbox.lock();
            if let Some(result) = outbox.delivered(&transaction_id) {
                tracing::debug!(transaction_id = %transaction_id, "Delivery answered from cache");
                return Ok(result);
            }
            if outbox.is_pending(&transaction_id) {
                return Ok(SettlementResult::new(
                    transaction_id,
                    StatusCode::GatewayUnreachable,
                ));
            }
        }

        let payload = ExternalPayload::credit_from_record(&record, self.bank.bank_code.clone());
        self.attempt(payload, &bank_code).await
    }

    /// One delivery run (with retries) for a payload
    async fn attempt(&self, payload: ExternalPayload, bank_code: &str) -> Result<SettlementResult> {
        let Some(counterparty) = self.directory.resolve(bank_code) else {
            return Ok(self.park(payload, bank_code, format!("Unknown bank {}", bank_code)));
        };

        let timeout = self.config.call_timeout();
        let outcome = self
            .config
            .retry
            .run(
                "settlement.deliver",
                || {
                    let counterparty = counterparty.clone();
                    let payload = payload.clone();
                    let bank_code = bank_code.to_string();
                    async move {
                        match tokio::time::timeout(timeout, counterparty.settle(payload)).await {
                            Ok(result) => result,
                            Err(_) => Err(Error::CounterpartyTimeout {
                                bank_code,
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        }
                    }
                },
                Error::is_transport,
            )
            .await;

        match outcome {
            Ok(result) if result.transaction_id != payload.transaction_id => {
                let reason = format!("Confirmation for wrong transaction {}", result.transaction_id);
                Ok(self.park(payload, bank_code, reason))
            }
            Ok(result) if result.status == StatusCode::GatewayUnreachable => {
                let reason = "Counterparty could not process the payload".to_string();
                Ok(self.park(payload, bank_code, reason))
            }
            Ok(result) => self.confirm(payload, bank_code, result).await,
            // Money already left the source account: never drop the payload
            Err(e) => Ok(self.park(payload, bank_code, e.to_string())),
        }
    }

    async fn confirm(
        &self,
        payload: ExternalPayload,
        bank_code: &str,
        result: SettlementResult,
    ) -> Result<SettlementResult> {
        if !result.is_settled() {
            if let Err(e) = self.refund(&payload, bank_code, result.status).await {
                tracing::error!(
                    transaction_id = %payload.transaction_id,
                    error = %e,
                    "Refund failed"
                );
                return Ok(self.park(payload, bank_code, e.to_string()));
            }
        }

        let pending = {
            let mut outbox = self.outbox.lock();
            outbox.mark_delivered(result);
            outbox.pending_len()
        };
        self.set_pending_gauge(pending);

        SETTLEMENT_DELIVERIES_TOTAL
            .with_label_values(&[self.bank.bank_code.as_str(), result.status.as_str()])
            .inc();
        tracing::info!(
            transaction_id = %result.transaction_id,
            bank = %bank_code,
            status = %result.status,
            "Delivered to counterparty"
        );
        Ok(result)
    }

    /// Credit the source account back after a peer refusal
    async fn refund(&self, payload: &ExternalPayload, bank_code: &str, status: StatusCode) -> Result<()> {
        let owner = self
            .ledger
            .account_owner(payload.source_account.clone())
            .await?;

        let refund = TransactionRecord::new(
            reversal_id(payload.transaction_id),
            TransactionOrigin::ExternalBank {
                bank_code: bank_code.to_string(),
            },
            payload.destination_account.clone(),
            payload.source_account.clone(),
            owner,
            payload.amount,
            format!("Reversal of {}: {}", payload.transaction_id, status),
        );

        let applied = self.apply(refund).await?;
        if applied.successful() {
            tracing::warn!(
                transaction_id = %payload.transaction_id,
                reversal_id = %applied.transaction_id,
                status = %status,
                "Counterparty refused, amount refunded"
            );
        } else {
            tracing::error!(
                transaction_id = %payload.transaction_id,
                reversal_id = %applied.transaction_id,
                refund_status = ?applied.status(),
                "Counterparty refused and refund was rejected"
            );
        }
        Ok(())
    }

    /// Hand a record to the ledger with a bounded wait.
    ///
    /// A lost request or reply is resolved by looking the ID up; the same
    /// record is resent only while the ledger has no processed result for it.
    async fn apply(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let transaction_id = record.transaction_id;
        let timeout = self.config.call_timeout();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match self.ledger.verify_and_apply_timeout(record.clone(), timeout).await {
                Ok(processed) => return Ok(processed),
                Err(ledger_core::Error::Bus(e)) => e,
                Err(e) => return Err(e.into()),
            };

            tracing::warn!(
                transaction_id = %transaction_id,
                attempt,
                error = %error,
                "No ledger reply, re-querying"
            );

            match self.ledger.get_transaction_timeout(transaction_id, timeout).await {
                Ok(Some(stored)) if stored.processed() => return Ok(stored),
                Ok(_) => {}
                Err(ledger_core::Error::Bus(e)) => {
                    tracing::warn!(transaction_id = %transaction_id, error = %e, "Re-query failed");
                }
                Err(e) => return Err(e.into()),
            }

            if attempt >= self.config.retry.max_attempts {
                return Err(ledger_core::Error::Bus(error).into());
            }
        }
    }

    fn park(&self, payload: ExternalPayload, bank_code: &str, reason: String) -> SettlementResult {
        let transaction_id = payload.transaction_id;
        tracing::warn!(
            transaction_id = %transaction_id,
            bank = %bank_code,
            reason = %reason,
            "Counterparty unreachable, payload parked"
        );

        let pending = {
            let mut outbox = self.outbox.lock();
            outbox.park(payload, bank_code, reason);
            outbox.pending_len()
        };
        self.set_pending_gauge(pending);

        SETTLEMENT_DELIVERIES_TOTAL
            .with_label_values(&[self.bank.bank_code.as_str(), "parked"])
            .inc();
        SettlementResult::new(transaction_id, StatusCode::GatewayUnreachable)
    }

    async fn redeliver_pending(&self) -> Result<RedeliveryReport> {
        let mut report = RedeliveryReport::default();

        // One run at a time
        if self.redelivering.swap(true, Ordering::AcqRel) {
            report.still_pending = self.outbox.lock().pending_len();
            return Ok(report);
        }

        let pending = self.outbox.lock().pending();
        for entry in pending {
            report.attempted += 1;
            match self.attempt(entry.payload, &entry.bank_code).await {
                Ok(result) if result.status != StatusCode::GatewayUnreachable => {
                    report.delivered += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Redelivery failed"),
            }
        }

        self.redelivering.store(false, Ordering::Release);
        report.still_pending = self.outbox.lock().pending_len();

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                still_pending = report.still_pending,
                "Redelivery run complete"
            );
        }
        Ok(report)
    }

    fn record_received(&self, result: &SettlementResult) {
        SETTLEMENT_RECEIVED_TOTAL
            .with_label_values(&[self.bank.bank_code.as_str(), result.status.as_str()])
            .inc();
    }

    fn set_pending_gauge(&self, pending: usize) {
        SETTLEMENT_OUTBOX_PENDING
            .with_label_values(&[self.bank.bank_code.as_str()])
            .set(pending as i64);
    }

    async fn handle_message(self: Arc<Self>, msg: GatewayMessage) {
        match msg {
            GatewayMessage::Receive { payload, response } => {
                response.respond(self.receive(payload).await);
            }
            GatewayMessage::ReceiveJson { bytes, response } => {
                response.respond(self.receive_json(&bytes).await);
            }
            GatewayMessage::Deliver { record, response } => {
                response.respond(self.deliver(record).await);
            }
            GatewayMessage::RedeliverPending { response } => {
                response.respond(self.redeliver_pending().await);
            }
            GatewayMessage::Pending { response } => {
                response.respond(self.outbox.lock().pending());
            }
            GatewayMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Best-effort recovery of the transaction ID from an undecodable payload
fn salvage_transaction_id(bytes: &[u8]) -> Uuid {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|value| {
            value
                .get("transaction_id")
                .and_then(|id| id.as_str())
                .and_then(|id| Uuid::parse_str(id).ok())
        })
        .unwrap_or_else(Uuid::nil)
}

/// Gateway service task
pub struct SettlementGateway {
    core: Arc<GatewayCore>,
    mailbox: Mailbox<GatewayMessage>,
}

impl std::fmt::Debug for SettlementGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementGateway")
            .field("bank", &self.core.bank)
            .finish()
    }
}

impl SettlementGateway {
    /// Create gateway for `bank`
    pub fn new(
        bank: BankIdentity,
        ledger: LedgerHandle,
        directory: Arc<dyn CounterpartyDirectory>,
        config: Config,
        mailbox: Mailbox<GatewayMessage>,
    ) -> Self {
        let core = GatewayCore {
            validator: PayloadValidator::new(bank.clone()),
            bank,
            ledger,
            directory,
            outbox: Mutex::new(Outbox::with_delivered_capacity(
                config.delivered_cache_capacity,
            )),
            redelivering: AtomicBool::new(false),
            config,
        };
        Self {
            core: Arc::new(core),
            mailbox,
        }
    }

    /// Run the gateway event loop
    pub async fn run(mut self) {
        let redelivery = self.core.config.redelivery_interval();
        let period = redelivery.unwrap_or(std::time::Duration::from_secs(3600));
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(bank = %self.core.bank.bank_code, "Settlement gateway started");

        loop {
            tokio::select! {
                msg = self.mailbox.recv() => match msg {
                    Some(GatewayMessage::Shutdown) => {
                        // Drain what is already queued, then stop
                        self.mailbox.close();
                    }
                    Some(msg) => {
                        tokio::spawn(self.core.clone().handle_message(msg));
                    }
                    None => break,
                },

                _ = timer.tick(), if redelivery.is_some() => {
                    let core = self.core.clone();
                    tokio::spawn(async move {
                        if let Err(e) = core.redeliver_pending().await {
                            tracing::error!("Error in periodic redelivery: {}", e);
                        }
                    });
                }
            }
        }

        tracing::info!(bank = %self.core.bank.bank_code, "Settlement gateway stopped");
    }
}

/// Handle for sending messages to the gateway
#[derive(Clone, Debug)]
pub struct GatewayHandle {
    client: ServiceClient<GatewayMessage>,
}

impl GatewayHandle {
    /// Wrap a bus client
    pub fn new(client: ServiceClient<GatewayMessage>) -> Self {
        Self { client }
    }

    /// Whether the gateway has stopped
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Process a payload from a peer bank
    pub async fn receive(&self, payload: ExternalPayload) -> Result<SettlementResult> {
        self.client
            .request(|response| GatewayMessage::Receive { payload, response })
            .await?
    }

    /// Process a JSON payload from a peer bank
    pub async fn receive_json(&self, bytes: impl Into<Vec<u8>>) -> Result<SettlementResult> {
        let bytes = bytes.into();
        self.client
            .request(|response| GatewayMessage::ReceiveJson { bytes, response })
            .await?
    }

    /// Deliver a settled record to its destination bank
    pub async fn deliver(&self, record: TransactionRecord) -> Result<SettlementResult> {
        self.client
            .request(|response| GatewayMessage::Deliver { record, response })
            .await?
    }

    /// Retry every parked payload now
    pub async fn redeliver_pending(&self) -> Result<RedeliveryReport> {
        self.client
            .request(|response| GatewayMessage::RedeliverPending { response })
            .await?
    }

    /// Snapshot of parked payloads
    pub async fn pending(&self) -> Result<Vec<PendingDelivery>> {
        Ok(self
            .client
            .request(|response| GatewayMessage::Pending { response })
            .await?)
    }

    /// Shutdown gateway
    pub async fn shutdown(&self) -> Result<()> {
        self.client.send(GatewayMessage::Shutdown).await?;
        Ok(())
    }
}

#[async_trait]
impl CounterpartyBank for GatewayHandle {
    async fn settle(&self, payload: ExternalPayload) -> Result<SettlementResult> {
        self.receive(payload).await
    }
}

/// Spawn the gateway service
pub fn spawn_gateway(
    bank: BankIdentity,
    ledger: LedgerHandle,
    directory: Arc<dyn CounterpartyDirectory>,
    config: Config,
) -> GatewayHandle {
    let (client, mailbox) = message_bus::mailbox(ServiceKind::Settlement, config.mailbox_capacity);
    let gateway = SettlementGateway::new(bank, ledger, directory, config, mailbox);

    tokio::spawn(async move {
        gateway.run().await;
    });

    GatewayHandle::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counterparty::StaticDirectory;
    use crate::types::Direction;
    use ledger_core::{LedgerMessage, OpenAccountRequest, CASH_ACCOUNT};
    use message_bus::RetryPolicy;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicU32;

    const LOCAL: &str = "NL01BANK0000000001";
    const FOREIGN: &str = "DE44OTHR0000000009";

    /// Peer that fails `failures` times, then answers with `status`
    struct ScriptedBank {
        failures: AtomicU32,
        status: StatusCode,
        calls: AtomicU32,
    }

    impl ScriptedBank {
        fn new(failures: u32, status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                status,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl CounterpartyBank for ScriptedBank {
        async fn settle(&self, payload: ExternalPayload) -> Result<SettlementResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Counterparty {
                    bank_code: "OTHR".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(SettlementResult::new(payload.transaction_id, self.status))
        }
    }

    fn test_config() -> Config {
        Config {
            call_timeout_ms: 200,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 4,
            },
            redelivery_interval_ms: 0,
            ..Config::default()
        }
    }

    async fn setup() -> (GatewayHandle, LedgerHandle, Arc<StaticDirectory>) {
        let (ledger, _) = ledger_core::spawn_ledger(&ledger_core::Config::default()).unwrap();
        ledger
            .open_account_with(OpenAccountRequest::new("J. Jansen").with_number(LOCAL))
            .await
            .unwrap();

        let directory = Arc::new(StaticDirectory::new());
        let gateway = spawn_gateway(
            BankIdentity::new("NL", "BANK"),
            ledger.clone(),
            directory.clone(),
            test_config(),
        );
        (gateway, ledger, directory)
    }

    /// Ledger in front of `real` that never answers the first `withheld`
    /// apply requests (applying them anyway when `apply_withheld`), and
    /// fails owner lookups when `owner_lookup_fails`.
    fn unreliable_ledger(
        real: LedgerHandle,
        withheld: u32,
        apply_withheld: bool,
        owner_lookup_fails: bool,
    ) -> (LedgerHandle, Arc<AtomicU32>) {
        let (client, mut mailbox) = message_bus::mailbox::<LedgerMessage>(ServiceKind::Ledger, 16);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        tokio::spawn(async move {
            let mut parked = Vec::new();
            while let Some(msg) = mailbox.recv().await {
                match msg {
                    LedgerMessage::VerifyAndApply { record, response } => {
                        let call = counter.fetch_add(1, Ordering::SeqCst);
                        if call < withheld {
                            if apply_withheld {
                                real.verify_and_apply(record).await.unwrap();
                            }
                            parked.push(response);
                        } else {
                            response.respond(real.verify_and_apply(record).await);
                        }
                    }
                    LedgerMessage::GetTransaction {
                        transaction_id,
                        response,
                    } => {
                        response.respond(real.get_transaction(transaction_id).await);
                    }
                    LedgerMessage::AccountOwner {
                        account_number,
                        response,
                    } => {
                        if owner_lookup_fails {
                            response.respond(Err(ledger_core::Error::Storage(
                                "owner index unavailable".to_string(),
                            )));
                        } else {
                            response.respond(real.account_owner(account_number).await);
                        }
                    }
                    _ => {}
                }
            }
        });

        (LedgerHandle::new(client), calls)
    }

    fn gateway_over(ledger: LedgerHandle, directory: Arc<StaticDirectory>) -> GatewayHandle {
        spawn_gateway(BankIdentity::new("NL", "BANK"), ledger, directory, test_config())
    }

    fn inbound(direction: Direction, amount: i64) -> ExternalPayload {
        let (source, destination) = match direction {
            Direction::Credit => (FOREIGN, LOCAL),
            Direction::Debit => (LOCAL, FOREIGN),
        };
        ExternalPayload {
            transaction_id: Uuid::now_v7(),
            sending_bank: "OTHR".to_string(),
            direction,
            source_account: source.to_string(),
            destination_account: destination.to_string(),
            destination_holder_name: "Holder".to_string(),
            amount: Decimal::from(amount),
            description: "Interbank".to_string(),
        }
    }

    async fn settled_outbound(ledger: &LedgerHandle, amount: i64) -> TransactionRecord {
        let deposit = TransactionRecord::new(
            Uuid::now_v7(),
            TransactionOrigin::Customer,
            CASH_ACCOUNT,
            LOCAL,
            "J. Jansen",
            Decimal::from(amount),
            "Deposit",
        );
        ledger.verify_and_apply(deposit).await.unwrap();

        let transfer = TransactionRecord::new(
            Uuid::now_v7(),
            TransactionOrigin::Customer,
            LOCAL,
            FOREIGN,
            "M. Muller",
            Decimal::from(amount),
            "Rent",
        );
        let record = ledger.verify_and_apply(transfer).await.unwrap();
        assert!(record.successful());
        record
    }

    #[tokio::test]
    async fn test_receive_credit_is_idempotent() {
        let (gateway, ledger, _) = setup().await;

        let payload = inbound(Direction::Credit, 25);
        let first = gateway.receive(payload.clone()).await.unwrap();
        let second = gateway.receive(payload.clone()).await.unwrap();

        assert_eq!(first, SettlementResult::new(payload.transaction_id, StatusCode::Settled));
        assert_eq!(first, second);
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(25));
    }

    #[tokio::test]
    async fn test_negative_amount_is_malformed_and_ledger_untouched() {
        let (gateway, ledger, _) = setup().await;

        let payload = inbound(Direction::Credit, -10);
        let result = gateway.receive(payload.clone()).await.unwrap();

        assert_eq!(result.status, StatusCode::MalformedTransaction);
        assert_eq!(result.transaction_id, payload.transaction_id);
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::ZERO);
        assert!(ledger.get_transaction(payload.transaction_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receive_json() {
        let (gateway, ledger, _) = setup().await;

        let payload = inbound(Direction::Credit, 7);
        let result = gateway
            .receive_json(serde_json::to_vec(&payload).unwrap())
            .await
            .unwrap();
        assert!(result.is_settled());
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(7));

        let garbage = gateway.receive_json(b"not json".to_vec()).await.unwrap();
        assert_eq!(garbage, SettlementResult::malformed(Uuid::nil()));

        let id = Uuid::now_v7();
        let partial = format!(r#"{{"transaction_id":"{}","amount":"5"}}"#, id);
        let result = gateway.receive_json(partial.into_bytes()).await.unwrap();
        assert_eq!(result, SettlementResult::malformed(id));
    }

    #[tokio::test]
    async fn test_debit_checks_funds() {
        let (gateway, ledger, _) = setup().await;

        let result = gateway.receive(inbound(Direction::Debit, 10)).await.unwrap();
        assert_eq!(result.status, StatusCode::InsufficientFunds);

        gateway.receive(inbound(Direction::Credit, 30)).await.unwrap();
        let result = gateway.receive(inbound(Direction::Debit, 10)).await.unwrap();
        assert!(result.is_settled());
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(20));
    }

    #[tokio::test]
    async fn test_deliver_retries_transient_failures() {
        let (gateway, ledger, directory) = setup().await;
        let peer = ScriptedBank::new(2, StatusCode::Settled);
        directory.register("OTHR", peer.clone());

        let record = settled_outbound(&ledger, 40).await;
        let result = gateway.deliver(record.clone()).await.unwrap();

        assert!(result.is_settled());
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);

        // Repeat delivery is answered from the cache
        let again = gateway.deliver(record).await.unwrap();
        assert_eq!(again, result);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_bank_is_parked_then_redelivered() {
        let (gateway, ledger, directory) = setup().await;

        let record = settled_outbound(&ledger, 15).await;
        let result = gateway.deliver(record.clone()).await.unwrap();
        assert_eq!(result.status, StatusCode::GatewayUnreachable);
        assert_eq!(result.transaction_id, record.transaction_id);

        let pending = gateway.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].bank_code, "OTHR");

        // Ledger result stands while parked
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::ZERO);

        let peer = ScriptedBank::new(0, StatusCode::Settled);
        directory.register("OTHR", peer.clone());

        let report = gateway.redeliver_pending().await.unwrap();
        assert_eq!(
            report,
            RedeliveryReport {
                attempted: 1,
                delivered: 1,
                still_pending: 0
            }
        );
        assert!(gateway.deliver(record).await.unwrap().is_settled());
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_park_payload() {
        let (gateway, ledger, directory) = setup().await;
        directory.register("OTHR", ScriptedBank::new(10, StatusCode::Settled));

        let record = settled_outbound(&ledger, 5).await;
        let result = gateway.deliver(record).await.unwrap();
        assert_eq!(result.status, StatusCode::GatewayUnreachable);
        assert_eq!(gateway.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_refusal_is_refunded_once() {
        let (gateway, ledger, directory) = setup().await;
        directory.register("OTHR", ScriptedBank::new(0, StatusCode::UnknownAccount));

        let record = settled_outbound(&ledger, 50).await;
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::ZERO);

        let result = gateway.deliver(record.clone()).await.unwrap();
        assert_eq!(result.status, StatusCode::UnknownAccount);
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(50));

        let refund = ledger
            .get_transaction(reversal_id(record.transaction_id))
            .await
            .unwrap()
            .unwrap();
        assert!(refund.successful());

        gateway.deliver(record).await.unwrap();
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(50));
    }

    #[tokio::test]
    async fn test_lost_ledger_reply_is_recovered_by_requery() {
        let (_, real, _) = setup().await;
        let (ledger, calls) = unreliable_ledger(real.clone(), 1, true, false);
        let gateway = gateway_over(ledger, Arc::new(StaticDirectory::new()));

        let payload = inbound(Direction::Credit, 25);
        let result = gateway.receive(payload.clone()).await.unwrap();

        assert_eq!(result, SettlementResult::new(payload.transaction_id, StatusCode::Settled));
        // Answered by the lookup, not by a second apply
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(real.get_balance(LOCAL).await.unwrap(), Decimal::from(25));
    }

    #[tokio::test]
    async fn test_lost_ledger_request_is_resent() {
        let (_, real, _) = setup().await;
        let (ledger, calls) = unreliable_ledger(real.clone(), 1, false, false);
        let gateway = gateway_over(ledger, Arc::new(StaticDirectory::new()));

        let result = gateway.receive(inbound(Direction::Credit, 9)).await.unwrap();

        assert!(result.is_settled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(real.get_balance(LOCAL).await.unwrap(), Decimal::from(9));
    }

    #[tokio::test]
    async fn test_silent_ledger_fails_receive_as_transport_error() {
        let (_, real, _) = setup().await;
        let (ledger, calls) = unreliable_ledger(real.clone(), u32::MAX, false, false);
        let gateway = gateway_over(ledger, Arc::new(StaticDirectory::new()));

        let payload = inbound(Direction::Credit, 4);
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            gateway.receive(payload.clone()),
        )
        .await
        .expect("gateway waited on the ledger without bound");

        let error = outcome.unwrap_err();
        assert!(error.is_transport(), "unexpected error {}", error);
        assert_eq!(calls.load(Ordering::SeqCst), test_config().retry.max_attempts);
        assert!(real.get_transaction(payload.transaction_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_owner_lookup_parks_instead_of_refunding() {
        let (_, real, directory) = setup().await;
        directory.register("OTHR", ScriptedBank::new(0, StatusCode::UnknownAccount));
        let record = settled_outbound(&real, 20).await;

        let (ledger, _) = unreliable_ledger(real.clone(), 0, false, true);
        let gateway = gateway_over(ledger, directory);

        let result = gateway.deliver(record.clone()).await.unwrap();
        assert_eq!(result.status, StatusCode::GatewayUnreachable);
        assert_eq!(gateway.pending().await.unwrap().len(), 1);

        // No refund went out under an empty holder name
        assert!(real
            .get_transaction(reversal_id(record.transaction_id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(real.get_balance(LOCAL).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_deliver_rejects_local_or_unsettled_records() {
        let (gateway, _ledger, _) = setup().await;

        let local = TransactionRecord::new(
            Uuid::now_v7(),
            TransactionOrigin::Customer,
            LOCAL,
            "NL02BANK0000000002",
            "X",
            Decimal::ONE,
            "",
        );
        assert!(matches!(
            gateway.deliver(local).await,
            Err(Error::NotDeliverable(_))
        ));

        let unsettled = TransactionRecord::new(
            Uuid::now_v7(),
            TransactionOrigin::Customer,
            LOCAL,
            FOREIGN,
            "X",
            Decimal::ONE,
            "",
        );
        assert!(matches!(
            gateway.deliver(unsettled).await,
            Err(Error::NotDeliverable(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_handle_is_a_counterparty() {
        let (gateway, ledger, _) = setup().await;
        let bank: Arc<dyn CounterpartyBank> = Arc::new(gateway);

        let result = bank.settle(inbound(Direction::Credit, 3)).await.unwrap();
        assert!(result.is_settled());
        assert_eq!(ledger.get_balance(LOCAL).await.unwrap(), Decimal::from(3));
    }
}
