//! Account ledger: balance-mutation engine
//!
//! Owns every account balance. A transaction is verified and applied in
//! one critical section:
//!
//! 1. Lock the transaction-id stripe and answer replays from the stored record
//! 2. Lock the stripes of every local account involved, in ascending order
//! 3. Check existence, balance floor and transfer limit
//! 4. Commit the record, the balance changes and the history entries in
//!    one write batch
//!
//! Stripes are picked by hashing, so transactions on unrelated accounts
//! run in parallel while two debits of the same account are linearized.
//!
//! # Example
//!
//! ```
//! use ledger_core::{AccountLedger, Config, TransactionOrigin, TransactionRecord};
//! use rust_decimal::Decimal;
//! use uuid::Uuid;
//!
//! let ledger = AccountLedger::open(&Config::default()).unwrap();
//! let account = ledger.open_account("J. Jansen").unwrap();
//!
//! let deposit = TransactionRecord::new(
//!     Uuid::now_v7(),
//!     TransactionOrigin::Customer,
//!     ledger_core::CASH_ACCOUNT,
//!     account.account_number.as_str(),
//!     "J. Jansen",
//!     Decimal::from(100),
//!     "ATM deposit",
//! );
//! let record = ledger.verify_and_apply(deposit).unwrap();
//! assert!(record.successful());
//! assert_eq!(ledger.get_balance(account.account_number.as_str()).unwrap(), Decimal::from(100));
//! ```

use crate::{
    metrics::Metrics,
    storage::{open_store, Keyspace, Store, WriteBatch},
    types::{
        Account, AccountNumber, AccountStatus, BankIdentity, FailureKind, Party, TransactionId,
        TransactionRecord,
    },
    Config, Error, Result,
};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Instant;

const META_ACCOUNT_SERIAL: &[u8] = b"account_serial";

/// Parameters for opening an account
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAccountRequest {
    /// Owner name
    pub owner: String,

    /// Explicit account number (allocated when `None`)
    pub account_number: Option<AccountNumber>,

    /// Transfer limit (ledger default when `None`)
    pub transfer_limit: Option<Decimal>,

    /// Overdraft allowance (ledger default when `None`)
    pub overdraft_limit: Option<Decimal>,
}

impl OpenAccountRequest {
    /// Request with ledger defaults
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            account_number: None,
            transfer_limit: None,
            overdraft_limit: None,
        }
    }

    /// Use an explicit account number
    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.account_number = Some(AccountNumber::new(number));
        self
    }

    /// Set transfer limit
    pub fn with_transfer_limit(mut self, limit: Decimal) -> Self {
        self.transfer_limit = Some(limit);
        self
    }

    /// Set overdraft allowance
    pub fn with_overdraft_limit(mut self, limit: Decimal) -> Self {
        self.overdraft_limit = Some(limit);
        self
    }
}

/// Balance-mutation engine
pub struct AccountLedger {
    store: Arc<dyn Store>,
    bank: BankIdentity,
    account_stripes: Vec<Mutex<()>>,
    transaction_stripes: Vec<Mutex<()>>,
    open_lock: Mutex<()>,
    default_overdraft_limit: Decimal,
    default_transfer_limit: Option<Decimal>,
    metrics: Metrics,
}

impl std::fmt::Debug for AccountLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLedger")
            .field("bank", &self.bank)
            .field("lock_stripes", &self.account_stripes.len())
            .finish()
    }
}

impl AccountLedger {
    /// Open ledger with the configured store
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.storage)?;
        Self::with_store(config, store)
    }

    /// Open ledger on an existing store
    pub fn with_store(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let stripes = config.lock_stripes.max(1);
        Ok(Self {
            store,
            bank: config.bank.clone(),
            account_stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            transaction_stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            open_lock: Mutex::new(()),
            default_overdraft_limit: config.default_overdraft_limit,
            default_transfer_limit: config.default_transfer_limit,
            metrics: Metrics::new()?,
        })
    }

    /// Bank running this ledger
    pub fn bank(&self) -> &BankIdentity {
        &self.bank
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Account lifecycle

    /// Open an account with balance 0 and default limits
    pub fn open_account(&self, owner: impl Into<String>) -> Result<Account> {
        self.open_account_with(OpenAccountRequest::new(owner))
    }

    /// Open an account
    pub fn open_account_with(&self, request: OpenAccountRequest) -> Result<Account> {
        let overdraft_limit = request
            .overdraft_limit
            .unwrap_or(self.default_overdraft_limit);
        let transfer_limit = request.transfer_limit.or(self.default_transfer_limit);
        check_limit("overdraft_limit", Some(overdraft_limit))?;
        check_limit("transfer_limit", transfer_limit)?;

        let _open = self.open_lock.lock();
        let mut batch = WriteBatch::new();

        let account_number = match request.account_number {
            Some(number) => {
                let number = AccountNumber::parse(number.as_str())?;
                if !self.bank.is_local(number.as_str()) {
                    return Err(Error::InvalidAccountNumber(format!(
                        "{} is not issued by bank {}",
                        number, self.bank.bank_code
                    )));
                }
                if self.load_account(number.as_str())?.is_some() {
                    return Err(Error::AccountExists(number.to_string()));
                }
                number
            }
            None => {
                let mut serial: u64 = self.load(Keyspace::Meta, META_ACCOUNT_SERIAL)?.unwrap_or(0);
                let number = loop {
                    serial += 1;
                    let candidate = AccountNumber::generate(&self.bank, serial);
                    if self.load_account(candidate.as_str())?.is_none() {
                        break candidate;
                    }
                };
                batch.put(Keyspace::Meta, META_ACCOUNT_SERIAL, bincode::serialize(&serial)?);
                number
            }
        };

        let _guard = self.account_stripes[self.account_stripe(account_number.as_str())].lock();

        let account = Account {
            account_number,
            owner: request.owner,
            balance: Decimal::ZERO,
            transfer_limit,
            overdraft_limit,
            status: AccountStatus::Active,
            opened_at: Utc::now(),
            closed_at: None,
            history_len: 0,
        };

        batch.put(
            Keyspace::Accounts,
            account.account_number.as_str().as_bytes(),
            bincode::serialize(&account)?,
        );
        self.store.write(batch)?;
        self.metrics.record_account_opened();

        tracing::info!(
            account = %account.account_number,
            owner = %account.owner,
            "Account opened"
        );

        Ok(account)
    }

    /// Close an account (balance must be exactly zero)
    pub fn close_account(&self, account_number: &str) -> Result<Account> {
        let _guard = self.account_stripes[self.account_stripe(account_number)].lock();

        let mut account = self.require_account(account_number)?;
        if !account.is_active() {
            return Err(Error::AccountClosed(account_number.to_string()));
        }
        if !account.balance.is_zero() {
            return Err(Error::AccountNotEmpty(format!(
                "{} holds {}",
                account_number, account.balance
            )));
        }

        account.status = AccountStatus::Closed;
        account.closed_at = Some(Utc::now());
        self.put_account(&account)?;

        tracing::info!(account = %account_number, "Account closed");
        Ok(account)
    }

    /// Set or clear the single-transaction ceiling
    pub fn set_transfer_limit(&self, account_number: &str, limit: Option<Decimal>) -> Result<Account> {
        check_limit("transfer_limit", limit)?;
        let _guard = self.account_stripes[self.account_stripe(account_number)].lock();

        let mut account = self.require_account(account_number)?;
        account.transfer_limit = limit;
        self.put_account(&account)?;

        tracing::info!(account = %account_number, limit = ?limit, "Transfer limit updated");
        Ok(account)
    }

    // Read paths (committed state only)

    /// Get account
    pub fn get_account(&self, account_number: &str) -> Result<Account> {
        self.require_account(account_number)
    }

    /// Get balance
    pub fn get_balance(&self, account_number: &str) -> Result<Decimal> {
        Ok(self.require_account(account_number)?.balance)
    }

    /// Owner registered for an account
    pub fn account_owner(&self, account_number: &str) -> Result<String> {
        Ok(self.require_account(account_number)?.owner)
    }

    /// All accounts, ordered by account number
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.store
            .scan_prefix(Keyspace::Accounts, &[])?
            .into_iter()
            .map(|(_, value)| Ok(bincode::deserialize(&value)?))
            .collect()
    }

    /// Stored result for a transaction ID
    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<TransactionRecord>> {
        self.load(Keyspace::Transactions, transaction_id.as_bytes())
    }

    /// Processed transactions touching an account, in insertion order
    pub fn get_history(&self, account_number: &str) -> Result<Vec<TransactionRecord>> {
        self.require_account(account_number)?;

        let prefix = history_prefix(account_number);
        let entries = self.store.scan_prefix(Keyspace::History, &prefix)?;

        let mut records = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let transaction_id: TransactionId = bincode::deserialize(&value)?;
            let record = self.get_transaction(transaction_id)?.ok_or_else(|| {
                Error::Storage(format!("History points at missing transaction {}", transaction_id))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    // Transaction pipeline

    /// Verify a transaction and apply it atomically
    ///
    /// Business refusals are returned as a processed, unsuccessful record.
    /// A transaction ID is applied at most once; replays get the stored record.
    pub fn verify_and_apply(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let start = Instant::now();
        let transaction_id = record.transaction_id;

        let _tx_guard = self.transaction_stripes[self.transaction_stripe(transaction_id)].lock();

        if let Some(stored) = self.get_transaction(transaction_id)? {
            self.metrics.record_replay();
            tracing::debug!(
                transaction_id = %transaction_id,
                state = %stored.state(),
                "Replay answered from stored result"
            );
            return Ok(stored);
        }

        if record.processed() {
            return Err(Error::InvalidRecord(format!(
                "{} is already {} but unknown to this ledger",
                transaction_id, record.state()
            )));
        }

        let mut record = record;
        record.begin_verification()?;

        let source = self.bank.classify(&record.source_account_number);
        let destination = self.bank.classify(&record.destination_account_number);

        if let Some(reason) = structural_problem(&record, &source, &destination) {
            tracing::warn!(transaction_id = %transaction_id, reason, "Malformed transaction");
            return self.finish(record, Err(FailureKind::MalformedTransaction), Vec::new(), start);
        }

        let mut local_accounts = Vec::with_capacity(2);
        if source == Party::Local {
            local_accounts.push(record.source_account_number.clone());
        }
        if destination == Party::Local {
            local_accounts.push(record.destination_account_number.clone());
        }
        let _account_guards = self.lock_accounts(&local_accounts);

        let source_account = match source {
            Party::Local => match self.load_account(&record.source_account_number)? {
                Some(account) if account.is_active() => Some(account),
                Some(closed) => {
                    return self.finish(record, Err(FailureKind::UnknownAccount), vec![closed], start)
                }
                None => return self.finish(record, Err(FailureKind::UnknownAccount), Vec::new(), start),
            },
            _ => None,
        };

        let destination_account = match destination {
            Party::Local => match self.load_account(&record.destination_account_number)? {
                Some(account) if account.is_active() => Some(account),
                _ => {
                    let touched = source_account.into_iter().collect();
                    return self.finish(record, Err(FailureKind::UnknownAccount), touched, start);
                }
            },
            _ => None,
        };

        let amount = record.amount;

        let mut debited = None;
        if let Some(account) = source_account {
            let remaining = match account.balance.checked_sub(amount) {
                Some(remaining) if remaining >= account.floor() => remaining,
                // Underflow is below any floor
                _ => {
                    return self.finish(record, Err(FailureKind::InsufficientFunds), vec![account], start)
                }
            };
            if matches!(account.transfer_limit, Some(limit) if amount > limit) {
                return self.finish(record, Err(FailureKind::LimitExceeded), vec![account], start);
            }
            debited = Some((account, remaining));
        }

        let mut credited = None;
        if let Some(account) = destination_account {
            match account.balance.checked_add(amount) {
                Some(total) => credited = Some((account, total)),
                None => {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        account = %account.account_number,
                        "Credit would overflow balance"
                    );
                    let touched = debited.map(|(source, _)| source).into_iter().collect();
                    return self.finish(record, Err(FailureKind::BalanceOverflow), touched, start);
                }
            }
        }

        let touched = debited
            .into_iter()
            .chain(credited)
            .map(|(mut account, balance)| {
                account.balance = balance;
                account
            })
            .collect();

        self.finish(record, Ok(()), touched, start)
    }

    /// Mark the record, commit it with the touched accounts, record metrics
    fn finish(
        &self,
        mut record: TransactionRecord,
        outcome: std::result::Result<(), FailureKind>,
        touched: Vec<Account>,
        start: Instant,
    ) -> Result<TransactionRecord> {
        match outcome {
            Ok(()) => record.settle()?,
            Err(kind) => record.reject(kind)?,
        }

        self.commit(&record, touched)?;

        let status = record
            .status()
            .ok_or_else(|| Error::InvalidRecord("record not terminal after commit".to_string()))?;
        self.metrics.record_outcome(status);
        self.metrics
            .record_apply_duration(start.elapsed().as_secs_f64());

        if record.successful() {
            tracing::info!(
                transaction_id = %record.transaction_id,
                source = %record.source_account_number,
                destination = %record.destination_account_number,
                amount = %record.amount,
                "Transaction settled"
            );
        } else {
            tracing::warn!(
                transaction_id = %record.transaction_id,
                source = %record.source_account_number,
                status = %status,
                "Transaction rejected"
            );
        }

        Ok(record)
    }

    /// Write record, account changes and history entries as one batch
    fn commit(&self, record: &TransactionRecord, touched: Vec<Account>) -> Result<()> {
        let mut batch = WriteBatch::new();
        let id_bytes = bincode::serialize(&record.transaction_id)?;

        for mut account in touched {
            let seq = account.history_len;
            account.history_len += 1;
            batch.put(
                Keyspace::History,
                history_key(account.account_number.as_str(), seq),
                id_bytes.clone(),
            );
            batch.put(
                Keyspace::Accounts,
                account.account_number.as_str().as_bytes(),
                bincode::serialize(&account)?,
            );
        }

        batch.put(
            Keyspace::Transactions,
            record.transaction_id.as_bytes().to_vec(),
            bincode::serialize(record)?,
        );

        self.store.write(batch)
    }

    // Helpers

    fn lock_accounts(&self, accounts: &[String]) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = accounts.iter().map(|a| self.account_stripe(a)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes
            .into_iter()
            .map(|i| self.account_stripes[i].lock())
            .collect()
    }

    fn account_stripe(&self, account_number: &str) -> usize {
        stripe_of(account_number.as_bytes(), self.account_stripes.len())
    }

    fn transaction_stripe(&self, transaction_id: TransactionId) -> usize {
        stripe_of(transaction_id.as_bytes(), self.transaction_stripes.len())
    }

    fn require_account(&self, account_number: &str) -> Result<Account> {
        self.load_account(account_number)?
            .ok_or_else(|| Error::AccountNotFound(account_number.to_string()))
    }

    fn load_account(&self, account_number: &str) -> Result<Option<Account>> {
        self.load(Keyspace::Accounts, account_number.as_bytes())
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.put(Keyspace::Accounts, account.account_number.as_str().as_bytes(), account)
    }

    fn load<T: DeserializeOwned>(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<T>> {
        match self.store.get(keyspace, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, keyspace: Keyspace, key: &[u8], value: &T) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(keyspace, key, bincode::serialize(value)?);
        self.store.write(batch)
    }
}

fn check_limit(name: &str, limit: Option<Decimal>) -> Result<()> {
    match limit {
        Some(value) if value < Decimal::ZERO => {
            Err(Error::InvalidLimit(format!("{} must not be negative: {}", name, value)))
        }
        _ => Ok(()),
    }
}

fn structural_problem(record: &TransactionRecord, source: &Party, destination: &Party) -> Option<&'static str> {
    if record.amount <= Decimal::ZERO {
        return Some("amount must be positive");
    }
    if record.source_account_number == record.destination_account_number {
        return Some("source and destination are the same account");
    }
    if *source == Party::Invalid || *destination == Party::Invalid {
        return Some("account number is not well formed");
    }
    if *source != Party::Local && *destination != Party::Local {
        return Some("neither side is a local account");
    }
    None
}

fn stripe_of(bytes: &[u8], stripes: usize) -> usize {
    let hash = blake3::hash(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(head) % stripes as u64) as usize
}

fn history_prefix(account_number: &str) -> Vec<u8> {
    let mut key = account_number.as_bytes().to_vec();
    key.push(b'|'); // Separator
    key
}

fn history_key(account_number: &str, seq: u64) -> Vec<u8> {
    let mut key = history_prefix(account_number);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
