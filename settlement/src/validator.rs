//! Structural validation of inbound payloads
//!
//! Runs before the ledger is touched; any error answers the calling bank
//! with `MALFORMED_TRANSACTION`.

use crate::types::{Direction, ExternalPayload};
use ledger_core::{AccountNumber, BankIdentity, Party};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub field_path: String,
    pub message: String,
}

/// Validation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, code: &str, field_path: &str, message: String) {
        self.errors.push(ValidationError {
            code: code.to_string(),
            field_path: field_path.to_string(),
            message,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error codes, in detection order
    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }
}

/// Validator for payloads received from peer banks
#[derive(Debug, Clone)]
pub struct PayloadValidator {
    bank: BankIdentity,
}

impl PayloadValidator {
    /// Create validator for the receiving bank
    pub fn new(bank: BankIdentity) -> Self {
        Self { bank }
    }

    /// Validate a payload
    pub fn validate(&self, payload: &ExternalPayload) -> ValidationResult {
        let mut result = ValidationResult::success();

        if payload.transaction_id.is_nil() {
            result.add_error("MISSING_FIELD", "transaction_id", "Transaction ID is nil".to_string());
        }
        if payload.sending_bank.trim().is_empty() {
            result.add_error("MISSING_FIELD", "sending_bank", "Sending bank is empty".to_string());
        }
        if payload.amount <= Decimal::ZERO {
            result.add_error(
                "INVALID_AMOUNT",
                "amount",
                format!("Amount must be positive: {}", payload.amount),
            );
        }

        let source_ok = self.check_account(&mut result, "source_account", &payload.source_account);
        let destination_ok =
            self.check_account(&mut result, "destination_account", &payload.destination_account);
        if !(source_ok && destination_ok) {
            return result;
        }

        if payload.source_account == payload.destination_account {
            result.add_error(
                "SAME_ACCOUNT",
                "destination_account",
                "Source and destination are the same account".to_string(),
            );
            return result;
        }

        // The local side must be ours and the foreign side the sender's
        let (local_field, local, foreign_field, foreign) = match payload.direction {
            Direction::Credit => (
                "destination_account",
                &payload.destination_account,
                "source_account",
                &payload.source_account,
            ),
            Direction::Debit => (
                "source_account",
                &payload.source_account,
                "destination_account",
                &payload.destination_account,
            ),
        };

        if self.bank.classify(local) != Party::Local {
            result.add_error(
                "DIRECTION_MISMATCH",
                local_field,
                format!("{} is not held at bank {}", local, self.bank.bank_code),
            );
        }

        match self.bank.classify(foreign) {
            Party::Foreign { bank_code } if bank_code == payload.sending_bank => {}
            Party::Foreign { bank_code } => result.add_error(
                "BANK_MISMATCH",
                foreign_field,
                format!("{} belongs to {}, not sender {}", foreign, bank_code, payload.sending_bank),
            ),
            _ => result.add_error(
                "DIRECTION_MISMATCH",
                foreign_field,
                format!("{} is not held at the sending bank", foreign),
            ),
        }

        result
    }

    fn check_account(&self, result: &mut ValidationResult, field: &str, account: &str) -> bool {
        if account.trim().is_empty() {
            result.add_error("MISSING_FIELD", field, "Account number is empty".to_string());
            false
        } else if !AccountNumber::is_well_formed(account) {
            result.add_error(
                "INVALID_ACCOUNT",
                field,
                format!("Account number is not well formed: {}", account),
            );
            false
        } else {
            true
        }
    }
}
