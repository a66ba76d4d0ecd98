//! Configuration for the settlement gateway

use message_bus::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settlement gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Gateway mailbox capacity
    pub mailbox_capacity: usize,

    /// Timeout for one call to a counterparty bank (ms)
    pub call_timeout_ms: u64,

    /// Retry policy for counterparty calls
    pub retry: RetryPolicy,

    /// Interval between automatic outbox redelivery runs (ms, 0 = off)
    pub redelivery_interval_ms: u64,

    /// Delivered outcomes remembered for duplicate deliveries (oldest dropped first)
    pub delivered_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement-gateway".to_string(),
            mailbox_capacity: 1000,
            call_timeout_ms: 2_000,
            retry: RetryPolicy::default(),
            redelivery_interval_ms: 30_000,
            delivered_cache_capacity: 10_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(timeout) = std::env::var("SETTLEMENT_CALL_TIMEOUT_MS") {
            config.call_timeout_ms = timeout.parse().map_err(|_| {
                crate::Error::Config(format!("Invalid SETTLEMENT_CALL_TIMEOUT_MS: {}", timeout))
            })?;
        }

        if let Ok(retries) = std::env::var("SETTLEMENT_MAX_RETRIES") {
            let retries: u32 = retries.parse().map_err(|_| {
                crate::Error::Config(format!("Invalid SETTLEMENT_MAX_RETRIES: {}", retries))
            })?;
            config.retry.max_attempts = retries + 1;
        }

        if let Ok(capacity) = std::env::var("SETTLEMENT_DELIVERED_CACHE_CAPACITY") {
            config.delivered_cache_capacity = capacity.parse().map_err(|_| {
                crate::Error::Config(format!(
                    "Invalid SETTLEMENT_DELIVERED_CACHE_CAPACITY: {}",
                    capacity
                ))
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
        if self.call_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "call_timeout_ms must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.delivered_cache_capacity == 0 {
            return Err(crate::Error::Config(
                "delivered_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Counterparty call timeout
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Redelivery interval, if enabled
    pub fn redelivery_interval(&self) -> Option<Duration> {
        (self.redelivery_interval_ms > 0).then(|| Duration::from_millis(self.redelivery_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call_timeout(), Duration::from_secs(2));
        assert!(config.redelivery_interval().is_some());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            service_name = "gw"
            mailbox_capacity = 10
            call_timeout_ms = 50
            redelivery_interval_ms = 0

            [retry]
            max_attempts = 5
            initial_delay_ms = 1
            max_delay_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.redelivery_interval().is_none());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.call_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.delivered_cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = toml::from_str("call_timeout_ms = 75").unwrap();
        assert_eq!(config.call_timeout_ms, 75);
        assert_eq!(config.delivered_cache_capacity, 10_000);
        assert_eq!(config.retry.max_attempts, RetryPolicy::default().max_attempts);
    }
}
