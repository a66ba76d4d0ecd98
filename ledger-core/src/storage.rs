//! Storage layer: a transactional key-value interface
//!
//! # Keyspaces
//!
//! - `accounts` - Account records (key: account number)
//! - `transactions` - Processed transaction records (key: transaction_id)
//! - `history` - Per-account history index (key: account || '|' || seq)
//! - `meta` - Counters (account serial)
//!
//! A [`WriteBatch`] is committed as one unit: either every put is visible
//! to readers or none is.

use crate::{
    config::{StorageBackend, StorageConfig},
    error::{Error, Result},
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Logical keyspaces (column families in RocksDB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    /// Account records
    Accounts,
    /// Transaction records
    Transactions,
    /// History index
    History,
    /// Counters
    Meta,
}

impl Keyspace {
    /// All keyspaces
    pub const ALL: [Keyspace; 4] = [
        Keyspace::Accounts,
        Keyspace::Transactions,
        Keyspace::History,
        Keyspace::Meta,
    ];

    /// Column family name
    pub fn name(&self) -> &'static str {
        match self {
            Keyspace::Accounts => "accounts",
            Keyspace::Transactions => "transactions",
            Keyspace::History => "history",
            Keyspace::Meta => "meta",
        }
    }
}

/// Set of puts committed atomically
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    puts: Vec<(Keyspace, Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    /// Create empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put
    pub fn put(&mut self, keyspace: Keyspace, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((keyspace, key.into(), value.into()));
    }

    /// Number of queued puts
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}

/// Transactional key-value store
pub trait Store: Send + Sync {
    /// Read a single key
    fn get(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Commit every put in the batch, or none
    fn write(&self, batch: WriteBatch) -> Result<()>;
}

/// Open the configured store
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => Ok(Arc::new(rocks::RocksStore::open(config)?)),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => Err(Error::Config(
            "RocksDB backend requires the `rocksdb` feature".to_string(),
        )),
    }
}

/// In-memory store
///
/// One write lock covers a whole batch, so readers see all of it or none.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspaces: RwLock<HashMap<Keyspace, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let keyspaces = self.keyspaces.read();
        Ok(keyspaces
            .get(&keyspace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn scan_prefix(&self, keyspace: Keyspace, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let keyspaces = self.keyspaces.read();
        let Some(entries) = keyspaces.get(&keyspace) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut keyspaces = self.keyspaces.write();
        for (keyspace, key, value) in batch.puts {
            keyspaces.entry(keyspace).or_default().insert(key, value);
        }
        Ok(())
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::{Keyspace, Store, WriteBatch};
    use crate::{
        config::StorageConfig,
        error::{Error, Result},
    };
    use rocksdb::{
        ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteOptions, DB,
    };

    /// Storage wrapper for RocksDB (one column family per keyspace)
    pub struct RocksStore {
        db: DB,
        sync_writes: bool,
    }

    impl std::fmt::Debug for RocksStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RocksStore")
                .field("path", &self.db.path())
                .field("sync_writes", &self.sync_writes)
                .finish()
        }
    }

    impl RocksStore {
        /// Open or create database
        pub fn open(config: &StorageConfig) -> Result<Self> {
            let path = &config.data_dir;
            std::fs::create_dir_all(path)?;

            let mut db_opts = Options::default();
            db_opts.create_if_missing(true);
            db_opts.create_missing_column_families(true);
            db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
            db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
            db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
            if config.rocksdb.enable_statistics {
                db_opts.enable_statistics();
            }

            let cf_descriptors = Keyspace::ALL
                .iter()
                .map(|ks| {
                    let mut opts = Options::default();
                    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                    ColumnFamilyDescriptor::new(ks.name(), opts)
                })
                .collect::<Vec<_>>();

            let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

            tracing::info!(path = ?path, "Opened RocksDB store");

            Ok(Self {
                db,
                sync_writes: config.rocksdb.sync_writes,
            })
        }

        fn cf_handle(&self, keyspace: Keyspace) -> Result<&ColumnFamily> {
            self.db
                .cf_handle(keyspace.name())
                .ok_or_else(|| Error::Storage(format!("Column family {} not found", keyspace.name())))
        }
    }

    impl Store for RocksStore {
        fn get(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>> {
            let cf = self.cf_handle(keyspace)?;
            Ok(self.db.get_cf(cf, key)?)
        }

        fn scan_prefix(
            &self,
            keyspace: Keyspace,
            prefix: &[u8],
        ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            let cf = self.cf_handle(keyspace)?;
            let iter = self
                .db
                .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

            let mut entries = Vec::new();
            for item in iter {
                let (key, value) = item?;
                if !key.starts_with(prefix) {
                    break;
                }
                entries.push((key.to_vec(), value.to_vec()));
            }
            Ok(entries)
        }

        fn write(&self, batch: WriteBatch) -> Result<()> {
            let mut rocks_batch = rocksdb::WriteBatch::default();
            for (keyspace, key, value) in batch.puts {
                let cf = self.cf_handle(keyspace)?;
                rocks_batch.put_cf(cf, key, value);
            }

            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(self.sync_writes);
            self.db.write_opt(rocks_batch, &write_opts)?;
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get(Keyspace::Accounts, b"nope").unwrap(), None);
        assert!(store.scan_prefix(Keyspace::History, b"x").unwrap().is_empty());
    }

    #[test]
    fn test_memory_batch_write() {
        let store = MemoryStore::new();

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Accounts, b"acc".to_vec(), b"1".to_vec());
        batch.put(Keyspace::Transactions, b"tx".to_vec(), b"2".to_vec());
        assert_eq!(batch.len(), 2);
        store.write(batch).unwrap();

        assert_eq!(store.get(Keyspace::Accounts, b"acc").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(Keyspace::Transactions, b"tx").unwrap(), Some(b"2".to_vec()));
        // Keyspaces are independent
        assert_eq!(store.get(Keyspace::Accounts, b"tx").unwrap(), None);
    }

    #[test]
    fn test_memory_prefix_scan_is_ordered() {
        let store = MemoryStore::new();

        let mut batch = WriteBatch::new();
        for seq in [3u64, 1, 2] {
            let mut key = b"ACC|".to_vec();
            key.extend_from_slice(&seq.to_be_bytes());
            batch.put(Keyspace::History, key, seq.to_be_bytes().to_vec());
        }
        batch.put(Keyspace::History, b"ACD|".to_vec(), b"other".to_vec());
        store.write(batch).unwrap();

        let entries = store.scan_prefix(Keyspace::History, b"ACC|").unwrap();
        let seqs: Vec<u64> = entries
            .iter()
            .map(|(_, v)| u64::from_be_bytes(v[..8].try_into().unwrap()))
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_open_memory_store() {
        let config = StorageConfig::default();
        let store = open_store(&config).unwrap();
        assert!(store.get(Keyspace::Meta, b"x").unwrap().is_none());
    }
}
