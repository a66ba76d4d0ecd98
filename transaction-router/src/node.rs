//! A complete bank: ledger, settlement gateway and router wired together

use crate::{
    config::Config,
    intent::{SubmitReply, SubmitRequest},
    router::{spawn_router, RouterHandle},
    Result,
};
use ledger_core::{AccountLedger, BankIdentity, LedgerHandle};
use rust_decimal::Decimal;
use settlement::{ExternalPayload, GatewayHandle, SettlementResult, StaticDirectory};
use std::sync::Arc;

/// Running bank node
#[derive(Debug, Clone)]
pub struct BankNode {
    bank: BankIdentity,
    ledger: LedgerHandle,
    account_ledger: Arc<AccountLedger>,
    gateway: GatewayHandle,
    router: RouterHandle,
    directory: Arc<StaticDirectory>,
}

impl BankNode {
    /// Start every service of a node. Must be called inside a Tokio runtime.
    pub fn start(config: Config) -> Result<Self> {
        Self::start_with_directory(config, Arc::new(StaticDirectory::new()))
    }

    /// Start with a shared counterparty directory
    pub fn start_with_directory(config: Config, directory: Arc<StaticDirectory>) -> Result<Self> {
        config.validate()?;
        let bank = config.ledger.bank.clone();

        let (ledger, account_ledger) = ledger_core::spawn_ledger(&config.ledger)?;
        let gateway = settlement::spawn_gateway(
            bank.clone(),
            ledger.clone(),
            directory.clone(),
            config.settlement.clone(),
        );
        let router = spawn_router(bank.clone(), ledger.clone(), gateway.clone(), &config);

        tracing::info!(
            bank = %bank.bank_code,
            country = %bank.country_code,
            "Bank node started"
        );

        Ok(Self {
            bank,
            ledger,
            account_ledger,
            gateway,
            router,
            directory,
        })
    }

    /// Identity of this bank
    pub fn bank(&self) -> &BankIdentity {
        &self.bank
    }

    /// Ledger service
    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    /// Ledger itself (metrics, direct inspection)
    pub fn account_ledger(&self) -> &Arc<AccountLedger> {
        &self.account_ledger
    }

    /// Settlement gateway service
    pub fn gateway(&self) -> &GatewayHandle {
        &self.gateway
    }

    /// Router service
    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Counterparty directory used for outbound deliveries
    pub fn directory(&self) -> &Arc<StaticDirectory> {
        &self.directory
    }

    /// Register each node's gateway in the other's directory
    pub fn connect(&self, peer: &BankNode) {
        self.directory
            .register(peer.bank.bank_code.clone(), Arc::new(peer.gateway.clone()));
        peer.directory
            .register(self.bank.bank_code.clone(), Arc::new(self.gateway.clone()));
    }

    /// Submit a front-end request
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReply> {
        self.router.submit(request).await
    }

    /// Transfer from a local account
    pub async fn submit_transaction(
        &self,
        source_account: impl Into<String>,
        destination_account: impl Into<String>,
        destination_holder_name: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<SubmitReply> {
        self.router
            .submit_transaction(
                source_account,
                destination_account,
                destination_holder_name,
                amount,
                description,
            )
            .await
    }

    /// Process a payload sent by a peer bank
    pub async fn receive_external_transaction(
        &self,
        payload: ExternalPayload,
    ) -> Result<SettlementResult> {
        Ok(self.gateway.receive(payload).await?)
    }

    /// Stop the router first so nothing new reaches the ledger, then the rest
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(bank = %self.bank.bank_code, "Shutting down bank node");
        self.router.shutdown().await?;
        self.gateway.shutdown().await?;
        self.ledger.shutdown().await?;
        Ok(())
    }
}
