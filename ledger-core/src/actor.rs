//! Ledger service
//!
//! Exposes an [`AccountLedger`] on the message bus:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      Router / Settlement gateway (many tasks)        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ LedgerHandle (Clone)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (mailbox task)              │
//! │   one spawn_blocking job per message                 │
//! └─────────────────────┬────────────────────────────────┘
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │   AccountLedger: striped locks + atomic WriteBatch   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The actor never serializes work itself; isolation between transactions
//! comes from the ledger's account locks, so unrelated transfers proceed
//! in parallel.

use crate::{
    ledger::{AccountLedger, OpenAccountRequest},
    types::{Account, TransactionId, TransactionRecord},
    Config, Result,
};
use message_bus::{Mailbox, Responder, ServiceClient, ServiceKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Message sent to the ledger service
#[derive(Debug)]
pub enum LedgerMessage {
    /// Verify and apply a transaction
    VerifyAndApply {
        record: TransactionRecord,
        response: Responder<Result<TransactionRecord>>,
    },

    /// Stored result for a transaction ID
    GetTransaction {
        transaction_id: TransactionId,
        response: Responder<Result<Option<TransactionRecord>>>,
    },

    /// Current balance
    GetBalance {
        account_number: String,
        response: Responder<Result<Decimal>>,
    },

    /// Processed transactions touching an account
    GetHistory {
        account_number: String,
        response: Responder<Result<Vec<TransactionRecord>>>,
    },

    /// Account details
    GetAccount {
        account_number: String,
        response: Responder<Result<Account>>,
    },

    /// Registered owner name
    AccountOwner {
        account_number: String,
        response: Responder<Result<String>>,
    },

    /// Open an account
    OpenAccount {
        request: OpenAccountRequest,
        response: Responder<Result<Account>>,
    },

    /// Close an account
    CloseAccount {
        account_number: String,
        response: Responder<Result<Account>>,
    },

    /// Set or clear a transfer limit
    SetTransferLimit {
        account_number: String,
        limit: Option<Decimal>,
        response: Responder<Result<Account>>,
    },

    /// Stop accepting messages; queued ones are still answered
    Shutdown,
}

/// Actor that serves ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    ledger: Arc<AccountLedger>,
    mailbox: Mailbox<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Arc<AccountLedger>, mailbox: Mailbox<LedgerMessage>) -> Self {
        Self { ledger, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        tracing::info!(bank = %self.ledger.bank().bank_code, "Ledger service started");

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => {
                    // Drain what is already queued, then stop
                    self.mailbox.close();
                }
                msg => {
                    let ledger = self.ledger.clone();
                    tokio::task::spawn_blocking(move || handle_message(&ledger, msg));
                }
            }
        }

        tracing::info!("Ledger service stopped");
    }
}

fn handle_message(ledger: &AccountLedger, msg: LedgerMessage) {
    match msg {
        LedgerMessage::VerifyAndApply { record, response } => {
            let result = ledger.verify_and_apply(record);
            if let Err(e) = &result {
                tracing::error!("Error applying transaction: {}", e);
            }
            response.respond(result);
        }

        LedgerMessage::GetTransaction {
            transaction_id,
            response,
        } => {
            response.respond(ledger.get_transaction(transaction_id));
        }

        LedgerMessage::GetBalance {
            account_number,
            response,
        } => {
            response.respond(ledger.get_balance(&account_number));
        }

        LedgerMessage::GetHistory {
            account_number,
            response,
        } => {
            response.respond(ledger.get_history(&account_number));
        }

        LedgerMessage::GetAccount {
            account_number,
            response,
        } => {
            response.respond(ledger.get_account(&account_number));
        }

        LedgerMessage::AccountOwner {
            account_number,
            response,
        } => {
            response.respond(ledger.account_owner(&account_number));
        }

        LedgerMessage::OpenAccount { request, response } => {
            response.respond(ledger.open_account_with(request));
        }

        LedgerMessage::CloseAccount {
            account_number,
            response,
        } => {
            response.respond(ledger.close_account(&account_number));
        }

        LedgerMessage::SetTransferLimit {
            account_number,
            limit,
            response,
        } => {
            response.respond(ledger.set_transfer_limit(&account_number, limit));
        }

        LedgerMessage::Shutdown => {
            // Handled in main loop
        }
    }
}

/// Handle for sending messages to the ledger service
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    client: ServiceClient<LedgerMessage>,
}

impl LedgerHandle {
    /// Wrap a bus client
    pub fn new(client: ServiceClient<LedgerMessage>) -> Self {
        Self { client }
    }

    /// Whether the service has stopped
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Verify and apply a transaction
    pub async fn verify_and_apply(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        self.client
            .request(|response| LedgerMessage::VerifyAndApply { record, response })
            .await?
    }

    /// Verify and apply, giving up after `timeout`
    ///
    /// A timed-out request may still be applied; re-query with
    /// [`get_transaction`](Self::get_transaction) before resending.
    pub async fn verify_and_apply_timeout(
        &self,
        record: TransactionRecord,
        timeout: Duration,
    ) -> Result<TransactionRecord> {
        self.client
            .request_timeout(timeout, |response| LedgerMessage::VerifyAndApply {
                record,
                response,
            })
            .await?
    }

    /// Stored result for a transaction ID
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>> {
        self.client
            .request(|response| LedgerMessage::GetTransaction {
                transaction_id,
                response,
            })
            .await?
    }

    /// Stored result for a transaction ID, giving up after `timeout`
    pub async fn get_transaction_timeout(
        &self,
        transaction_id: TransactionId,
        timeout: Duration,
    ) -> Result<Option<TransactionRecord>> {
        self.client
            .request_timeout(timeout, |response| LedgerMessage::GetTransaction {
                transaction_id,
                response,
            })
            .await?
    }

    /// Current balance
    pub async fn get_balance(&self, account_number: impl Into<String>) -> Result<Decimal> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::GetBalance {
                account_number,
                response,
            })
            .await?
    }

    /// Processed transactions touching an account
    pub async fn get_history(
        &self,
        account_number: impl Into<String>,
    ) -> Result<Vec<TransactionRecord>> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::GetHistory {
                account_number,
                response,
            })
            .await?
    }

    /// Account details
    pub async fn get_account(&self, account_number: impl Into<String>) -> Result<Account> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::GetAccount {
                account_number,
                response,
            })
            .await?
    }

    /// Registered owner name
    pub async fn account_owner(&self, account_number: impl Into<String>) -> Result<String> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::AccountOwner {
                account_number,
                response,
            })
            .await?
    }

    /// Open an account with default limits
    pub async fn open_account(&self, owner: impl Into<String>) -> Result<Account> {
        self.open_account_with(OpenAccountRequest::new(owner)).await
    }

    /// Open an account
    pub async fn open_account_with(&self, request: OpenAccountRequest) -> Result<Account> {
        self.client
            .request(|response| LedgerMessage::OpenAccount { request, response })
            .await?
    }

    /// Close an account
    pub async fn close_account(&self, account_number: impl Into<String>) -> Result<Account> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::CloseAccount {
                account_number,
                response,
            })
            .await?
    }

    /// Set or clear a transfer limit
    pub async fn set_transfer_limit(
        &self,
        account_number: impl Into<String>,
        limit: Option<Decimal>,
    ) -> Result<Account> {
        let account_number = account_number.into();
        self.client
            .request(|response| LedgerMessage::SetTransferLimit {
                account_number,
                limit,
                response,
            })
            .await?
    }

    /// Shutdown service
    pub async fn shutdown(&self) -> Result<()> {
        self.client.send(LedgerMessage::Shutdown).await?;
        Ok(())
    }
}

/// Spawn the ledger service for an existing ledger
pub fn spawn_ledger_actor(ledger: Arc<AccountLedger>, mailbox_capacity: usize) -> LedgerHandle {
    let (client, mailbox) = message_bus::mailbox(ServiceKind::Ledger, mailbox_capacity);
    let actor = LedgerActor::new(ledger, mailbox);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(client)
}

/// Open a ledger from configuration and spawn its service
pub fn spawn_ledger(config: &Config) -> Result<(LedgerHandle, Arc<AccountLedger>)> {
    let ledger = Arc::new(AccountLedger::open(config)?);
    let handle = spawn_ledger_actor(ledger.clone(), config.mailbox_capacity);
    Ok((handle, ledger))
}
