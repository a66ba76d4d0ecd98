//! Configuration for the ledger

use crate::types::BankIdentity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Bank running this ledger
    pub bank: BankIdentity,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Number of lock stripes for account and transaction critical sections
    pub lock_stripes: usize,

    /// Ledger service mailbox capacity
    pub mailbox_capacity: usize,

    /// Overdraft allowance given to newly opened accounts
    pub default_overdraft_limit: Decimal,

    /// Transfer limit given to newly opened accounts
    pub default_transfer_limit: Option<Decimal>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            bank: BankIdentity::default(),
            storage: StorageConfig::default(),
            lock_stripes: 64,
            mailbox_capacity: 1000,
            default_overdraft_limit: Decimal::ZERO,
            default_transfer_limit: None,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process ordered maps (lost on restart)
    Memory,
    /// RocksDB (requires the `rocksdb` feature)
    Rocksdb,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend
    pub backend: StorageBackend,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data/ledger"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync WAL on every write batch
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            sync_writes: true,
            enable_statistics: false,
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

        if let Ok(code) = std::env::var("LEDGER_BANK_CODE") {
            config.bank.bank_code = code;
        }

        if let Ok(code) = std::env::var("LEDGER_COUNTRY_CODE") {
            config.bank.country_code = code;
        }

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("LEDGER_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::Rocksdb,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown storage backend: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check bank identity and limits
    pub fn validate(&self) -> crate::Result<()> {
        let bank = &self.bank;
        if bank.country_code.len() != 2 || !bank.country_code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(crate::Error::Config(format!(
                "Country code must be 2 uppercase letters: {}",
                bank.country_code
            )));
        }
        if bank.bank_code.len() != 4
            || !bank
                .bank_code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(crate::Error::Config(format!(
                "Bank code must be 4 uppercase alphanumerics: {}",
                bank.bank_code
            )));
        }
        if self.lock_stripes == 0 {
            return Err(crate::Error::Config("lock_stripes must be > 0".to_string()));
        }
        if self.default_overdraft_limit < Decimal::ZERO {
            return Err(crate::Error::Config(
                "default_overdraft_limit must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
