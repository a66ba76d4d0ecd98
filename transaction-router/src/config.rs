//! Configuration for a bank node
//!
//! Router settings plus the nested ledger and settlement sections, so one
//! TOML file describes a whole node:
//!
//! ```toml
//! ledger_timeout_ms = 500
//! ledger_retries = 2
//!
//! [ledger.bank]
//! country_code = "NL"
//! bank_code = "BANK"
//!
//! [settlement]
//! call_timeout_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Router and node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Router mailbox capacity
    pub mailbox_capacity: usize,

    /// Wait for one ledger reply (ms)
    pub ledger_timeout_ms: u64,

    /// Re-sends of the same record after a timed-out, uncommitted attempt
    pub ledger_retries: u32,

    /// Ledger configuration
    pub ledger: ledger_core::Config,

    /// Settlement gateway configuration
    pub settlement: settlement::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "transaction-router".to_string(),
            mailbox_capacity: 1000,
            ledger_timeout_ms: 1_000,
            ledger_retries: 2,
            ledger: ledger_core::Config::default(),
            settlement: settlement::Config::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            ledger: ledger_core::Config::from_env()?,
            settlement: settlement::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(timeout) = std::env::var("ROUTER_LEDGER_TIMEOUT_MS") {
            config.ledger_timeout_ms = timeout.parse().map_err(|_| {
                crate::Error::Config(format!("Invalid ROUTER_LEDGER_TIMEOUT_MS: {}", timeout))
            })?;
        }

        if let Ok(retries) = std::env::var("ROUTER_LEDGER_RETRIES") {
            config.ledger_retries = retries.parse().map_err(|_| {
                crate::Error::Config(format!("Invalid ROUTER_LEDGER_RETRIES: {}", retries))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.ledger_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "ledger_timeout_ms must be positive".to_string(),
            ));
        }
        self.ledger.validate()?;
        self.settlement.validate()?;
        Ok(())
    }

    /// Ledger reply timeout
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            ledger_timeout_ms = 250
            ledger_retries = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger_timeout_ms, 250);
        assert_eq!(config.ledger_retries, 4);
        assert_eq!(config.mailbox_capacity, 1000);
        assert_eq!(config.ledger.bank.bank_code, "BANK");
    }

    #[test]
    fn test_invalid_timeout() {
        let config = Config {
            ledger_timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
