//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Explicit lifecycle (a record only moves forward through its states)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique transaction identifier (UUIDv7, assigned at intake)
pub type TransactionId = Uuid;

/// Pseudo-account standing for the cash desk / ATM.
///
/// Deposits come from it and withdrawals go to it; it has no balance.
pub const CASH_ACCOUNT: &str = "CASH";

/// Length of a well-formed account number (`CC` + 2 check digits + 4-char bank code + 10 digits)
pub const ACCOUNT_NUMBER_LEN: usize = 18;

/// Account number (IBAN-like, e.g. `NL01BANK0000000001`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create account number without validation
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Parse and validate structure
    pub fn parse(number: &str) -> crate::Result<Self> {
        if Self::is_well_formed(number) {
            Ok(Self(number.to_string()))
        } else {
            Err(crate::Error::InvalidAccountNumber(number.to_string()))
        }
    }

    /// Structural check: country letters, check digits, bank code, serial digits
    pub fn is_well_formed(number: &str) -> bool {
        let bytes = number.as_bytes();
        bytes.len() == ACCOUNT_NUMBER_LEN
            && bytes[..2].iter().all(u8::is_ascii_uppercase)
            && bytes[2..4].iter().all(u8::is_ascii_digit)
            && bytes[4..8]
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            && bytes[8..].iter().all(u8::is_ascii_digit)
    }

    /// Build a number for a bank with ISO 13616 mod-97 check digits
    pub fn generate(identity: &BankIdentity, serial: u64) -> Self {
        let bban = format!("{}{:010}", identity.bank_code, serial % 10_000_000_000);
        let check = iban_check_digits(&identity.country_code, &bban);
        Self(format!("{}{:02}{}", identity.country_code, check, bban))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Country code (first 2 chars)
    pub fn country_code(&self) -> Option<&str> {
        self.0.get(..2)
    }

    /// Bank code (chars 4..8)
    pub fn bank_code(&self) -> Option<&str> {
        if Self::is_well_formed(&self.0) {
            self.0.get(4..8)
        } else {
            None
        }
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountNumber {
    fn from(number: &str) -> Self {
        Self::new(number)
    }
}

fn iban_check_digits(country_code: &str, bban: &str) -> u32 {
    let rearranged = format!("{}{}00", bban, country_code);
    let mut remainder = 0u32;
    for c in rearranged.chars() {
        let value = match c.to_digit(36) {
            Some(v) => v,
            None => continue,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    98 - remainder
}

/// Identity of the bank running this ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankIdentity {
    /// ISO 3166 country code (2 letters)
    pub country_code: String,

    /// Bank code embedded in every local account number (4 chars)
    pub bank_code: String,
}

impl Default for BankIdentity {
    fn default() -> Self {
        Self {
            country_code: "NL".to_string(),
            bank_code: "BANK".to_string(),
        }
    }
}

impl BankIdentity {
    /// Create identity
    pub fn new(country_code: impl Into<String>, bank_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            bank_code: bank_code.into(),
        }
    }

    /// Decide who manages an account number
    pub fn classify(&self, account: &str) -> Party {
        if account == CASH_ACCOUNT {
            return Party::Cash;
        }
        match AccountNumber::new(account).bank_code() {
            Some(code) if code == self.bank_code => Party::Local,
            Some(code) => Party::Foreign {
                bank_code: code.to_string(),
            },
            None => Party::Invalid,
        }
    }

    /// Whether the account is managed by this bank
    pub fn is_local(&self, account: &str) -> bool {
        self.classify(account) == Party::Local
    }
}

/// Who manages one side of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    /// Account held at this bank (balance owned by this ledger)
    Local,
    /// Account held at a counterparty bank
    Foreign {
        /// Counterparty bank code
        bank_code: String,
    },
    /// Cash desk / ATM
    Cash,
    /// Not a well-formed account number
    Invalid,
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Accepts debits and credits
    Active,
    /// Closed with zero balance, kept for history
    Closed,
}

/// Customer account (owned exclusively by the ledger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account number (immutable once issued)
    pub account_number: AccountNumber,

    /// Owner name as registered by the customer service
    pub owner: String,

    /// Current balance
    pub balance: Decimal,

    /// Ceiling on a single outgoing transaction
    pub transfer_limit: Option<Decimal>,

    /// Allowed overdraft; the balance floor is `-overdraft_limit`
    pub overdraft_limit: Decimal,

    /// Lifecycle status
    pub status: AccountStatus,

    /// Opened timestamp
    pub opened_at: DateTime<Utc>,

    /// Closed timestamp
    pub closed_at: Option<DateTime<Utc>>,

    /// Number of history entries (next history sequence number)
    pub history_len: u64,
}

impl Account {
    /// Lowest balance this account may reach
    pub fn floor(&self) -> Decimal {
        -self.overdraft_limit
    }

    /// Whether transactions may touch this account
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Amount that can still be debited
    pub fn available(&self) -> Decimal {
        self.balance.saturating_sub(self.floor())
    }
}

/// Where a transaction entered the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOrigin {
    /// Customer-facing front-end (PIN terminal, UI, API) via the router
    Customer,
    /// Peer bank via the settlement gateway
    ExternalBank {
        /// Sending bank code
        bank_code: String,
    },
}

/// Transaction lifecycle state
///
/// `Created -> Verifying -> {Settled, Rejected}`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Intake (router or gateway)
    Created,
    /// In flight to the ledger
    Verifying,
    /// Applied (terminal)
    Settled,
    /// Refused by the ledger (terminal)
    Rejected,
}

impl TransactionState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Settled | TransactionState::Rejected)
    }

    /// Whether `self -> next` is an allowed transition
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Created, Verifying) | (Verifying, Settled) | (Verifying, Rejected)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Created => "CREATED",
            TransactionState::Verifying => "VERIFYING",
            TransactionState::Settled => "SETTLED",
            TransactionState::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Why the ledger refused a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Local account missing or closed
    UnknownAccount,
    /// Debit would take the balance below its floor
    InsufficientFunds,
    /// Amount above the source account's transfer limit
    LimitExceeded,
    /// Structurally invalid transaction
    MalformedTransaction,
    /// Credit would take a balance past the largest representable amount
    BalanceOverflow,
}

impl FailureKind {
    /// Status code surfaced to callers
    pub fn status(&self) -> StatusCode {
        match self {
            FailureKind::UnknownAccount => StatusCode::UnknownAccount,
            FailureKind::InsufficientFunds => StatusCode::InsufficientFunds,
            FailureKind::LimitExceeded => StatusCode::LimitExceeded,
            FailureKind::MalformedTransaction => StatusCode::MalformedTransaction,
            FailureKind::BalanceOverflow => StatusCode::LimitExceeded,
        }
    }
}

/// Status codes surfaced to originators and peer banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Transaction applied
    Settled,
    /// Source balance too low
    InsufficientFunds,
    /// Local account missing or closed
    UnknownAccount,
    /// Above transfer limit
    LimitExceeded,
    /// Rejected before touching the ledger
    MalformedTransaction,
    /// Counterparty bank could not be reached; delivery is queued
    GatewayUnreachable,
}

impl StatusCode {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Settled => "SETTLED",
            StatusCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            StatusCode::UnknownAccount => "UNKNOWN_ACCOUNT",
            StatusCode::LimitExceeded => "LIMIT_EXCEEDED",
            StatusCode::MalformedTransaction => "MALFORMED_TRANSACTION",
            StatusCode::GatewayUnreachable => "GATEWAY_UNREACHABLE",
        }
    }

    /// Whether this is the success code
    pub fn is_settled(&self) -> bool {
        *self == StatusCode::Settled
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction record shared by router, gateway and ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction ID (idempotency key)
    pub transaction_id: TransactionId,

    /// Intake channel
    pub origin: TransactionOrigin,

    /// Account debited
    pub source_account_number: String,

    /// Account credited
    pub destination_account_number: String,

    /// Destination holder name as given by the originator
    pub destination_account_holder_name: String,

    /// Magnitude moved from source to destination (always positive)
    pub amount: Decimal,

    /// Free text ("ATM withdrawal card #123", "PIN transaction", ...)
    pub description: String,

    /// Lifecycle state (changed only through `transition`)
    state: TransactionState,

    /// Failure reason when rejected
    failure: Option<FailureKind>,

    /// Intake timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of the ledger's final determination
    pub processed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Create a record at intake (state `Created`)
    pub fn new(
        transaction_id: TransactionId,
        origin: TransactionOrigin,
        source_account_number: impl Into<String>,
        destination_account_number: impl Into<String>,
        destination_account_holder_name: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            origin,
            source_account_number: source_account_number.into(),
            destination_account_number: destination_account_number.into(),
            destination_account_holder_name: destination_account_holder_name.into(),
            amount,
            description: description.into(),
            state: TransactionState::Created,
            failure: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Failure reason when rejected
    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// Ledger has made its final determination
    pub fn processed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applied successfully (only meaningful when processed)
    pub fn successful(&self) -> bool {
        self.state == TransactionState::Settled
    }

    /// Status code once processed
    pub fn status(&self) -> Option<StatusCode> {
        match self.state {
            TransactionState::Settled => Some(StatusCode::Settled),
            TransactionState::Rejected => Some(
                self.failure
                    .unwrap_or(FailureKind::MalformedTransaction)
                    .status(),
            ),
            TransactionState::Created | TransactionState::Verifying => None,
        }
    }

    /// Move to a new state
    pub fn transition(&mut self, next: TransactionState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition {
                transaction_id: self.transaction_id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark as in flight to the ledger (no-op if already verifying)
    pub fn begin_verification(&mut self) -> crate::Result<()> {
        if self.state == TransactionState::Verifying {
            return Ok(());
        }
        self.transition(TransactionState::Verifying)
    }

    /// Mark as applied
    pub fn settle(&mut self) -> crate::Result<()> {
        self.transition(TransactionState::Settled)?;
        self.failure = None;
        Ok(())
    }

    /// Mark as refused
    pub fn reject(&mut self, failure: FailureKind) -> crate::Result<()> {
        self.transition(TransactionState::Rejected)?;
        self.failure = Some(failure);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TransactionRecord {
        TransactionRecord::new(
            Uuid::now_v7(),
            TransactionOrigin::Customer,
            "NL01BANK0000000001",
            "NL02BANK0000000002",
            "J. Jansen",
            Decimal::new(6000, 2),
            "PIN transaction",
        )
    }

    #[test]
    fn test_account_number_well_formed() {
        assert!(AccountNumber::is_well_formed("NL01BANK0000000001"));
        assert!(AccountNumber::is_well_formed("DE89AB120000000042"));
        assert!(!AccountNumber::is_well_formed("NL01BANK000000001"));
        assert!(!AccountNumber::is_well_formed("nl01BANK0000000001"));
        assert!(!AccountNumber::is_well_formed("NLX1BANK0000000001"));
        assert!(!AccountNumber::is_well_formed("NL01BANK00000000A1"));
        assert!(!AccountNumber::is_well_formed(""));
        assert!(AccountNumber::parse("CASH").is_err());
    }

    #[test]
    fn test_account_number_parts() {
        let number = AccountNumber::new("NL01BANK0000000001");
        assert_eq!(number.country_code(), Some("NL"));
        assert_eq!(number.bank_code(), Some("BANK"));
        assert_eq!(AccountNumber::new("garbage").bank_code(), None);
    }

    #[test]
    fn test_generated_number_has_valid_check_digits() {
        let identity = BankIdentity::new("NL", "ABNA");
        let number = AccountNumber::generate(&identity, 417_164_300);
        // Well-known example IBAN NL91ABNA0417164300
        assert_eq!(number.as_str(), "NL91ABNA0417164300");
        assert!(AccountNumber::is_well_formed(number.as_str()));
    }

    #[test]
    fn test_classify_parties() {
        let identity = BankIdentity::new("NL", "BANK");
        assert_eq!(identity.classify("NL01BANK0000000001"), Party::Local);
        assert_eq!(
            identity.classify("NL01OTHR0000000001"),
            Party::Foreign {
                bank_code: "OTHR".to_string()
            }
        );
        assert_eq!(identity.classify(CASH_ACCOUNT), Party::Cash);
        assert_eq!(identity.classify("???"), Party::Invalid);
    }

    #[test]
    fn test_state_transitions() {
        let mut rec = record();
        assert!(!rec.processed());
        assert_eq!(rec.status(), None);

        rec.begin_verification().unwrap();
        rec.begin_verification().unwrap();
        assert_eq!(rec.state(), TransactionState::Verifying);

        rec.settle().unwrap();
        assert!(rec.processed());
        assert!(rec.successful());
        assert!(rec.processed_at.is_some());
        assert_eq!(rec.status(), Some(StatusCode::Settled));

        // No transition leaves a terminal state
        assert!(rec.reject(FailureKind::InsufficientFunds).is_err());
        assert!(rec.begin_verification().is_err());
        assert!(rec.successful());
    }

    #[test]
    fn test_reject_records_failure() {
        let mut rec = record();
        rec.begin_verification().unwrap();
        rec.reject(FailureKind::LimitExceeded).unwrap();
        assert_eq!(rec.failure(), Some(FailureKind::LimitExceeded));
        assert!(rec.processed());
        assert!(!rec.successful());
        assert_eq!(rec.status(), Some(StatusCode::LimitExceeded));
    }

    #[test]
    fn test_terminal_states_only_reached_through_verification() {
        let mut rec = record();
        assert!(matches!(
            rec.settle(),
            Err(crate::Error::InvalidTransition {
                from: TransactionState::Created,
                to: TransactionState::Settled,
                ..
            })
        ));
        assert!(rec.reject(FailureKind::UnknownAccount).is_err());
        assert_eq!(rec.state(), TransactionState::Created);
        assert_eq!(rec.failure(), None);
        assert!(!rec.processed());

        assert!(!TransactionState::Created.can_transition_to(TransactionState::Settled));
        assert!(!TransactionState::Created.can_transition_to(TransactionState::Rejected));
        assert!(TransactionState::Created.can_transition_to(TransactionState::Verifying));
    }

    #[test]
    fn test_status_code_wire_names() {
        assert_eq!(StatusCode::GatewayUnreachable.to_string(), "GATEWAY_UNREACHABLE");
        assert_eq!(StatusCode::InsufficientFunds.as_str(), "INSUFFICIENT_FUNDS");
        assert!(StatusCode::Settled.is_settled());
        assert!(!StatusCode::LimitExceeded.is_settled());
    }

    #[test]
    fn test_account_floor() {
        let account = Account {
            account_number: AccountNumber::new("NL01BANK0000000001"),
            owner: "J. Jansen".to_string(),
            balance: Decimal::from(10),
            transfer_limit: None,
            overdraft_limit: Decimal::from(50),
            status: AccountStatus::Active,
            opened_at: Utc::now(),
            closed_at: None,
            history_len: 0,
        };
        assert_eq!(account.floor(), Decimal::from(-50));
        assert_eq!(account.available(), Decimal::from(60));
    }
}
