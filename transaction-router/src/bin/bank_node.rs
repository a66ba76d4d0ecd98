//! Bank node binary
//!
//! Configuration comes from the TOML file named by `BANK_NODE_CONFIG`,
//! or from environment variables when it is unset.

use tracing::info;
use transaction_router::{BankNode, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Bank node starting...");

    // Load configuration
    let config = match std::env::var("BANK_NODE_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            Config::from_file(path)?
        }
        Err(_) => Config::from_env()?,
    };

    info!(
        "Configuration loaded - bank: {}{}, storage: {:?}, ledger timeout: {}ms",
        config.ledger.bank.country_code,
        config.ledger.bank.bank_code,
        config.ledger.storage.backend,
        config.ledger_timeout_ms
    );

    let node = BankNode::start(config)?;

    info!("Bank node ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    node.shutdown().await?;
    info!("Bank node stopped");

    Ok(())
}
