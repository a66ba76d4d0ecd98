//! Core types for the settlement gateway

use chrono::{DateTime, Utc};
use ledger_core::{StatusCode, TransactionId, TransactionOrigin, TransactionRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the payload is held at the receiving bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Foreign source, local destination (credit-only)
    Credit,
    /// Local source, foreign destination (debit-only)
    Debit,
}

/// Transaction exchanged between banks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPayload {
    /// Transaction ID assigned by the originating bank (idempotency key)
    pub transaction_id: TransactionId,

    /// Bank code of the sender
    pub sending_bank: String,

    /// Direction relative to the receiver
    pub direction: Direction,

    /// Account debited
    pub source_account: String,

    /// Account credited
    pub destination_account: String,

    /// Destination holder name
    pub destination_holder_name: String,

    /// Amount (decimal string on the wire)
    pub amount: Decimal,

    /// Free text
    pub description: String,
}

impl ExternalPayload {
    /// Outbound credit for a record settled at this bank
    pub fn credit_from_record(record: &TransactionRecord, sending_bank: impl Into<String>) -> Self {
        Self {
            transaction_id: record.transaction_id,
            sending_bank: sending_bank.into(),
            direction: Direction::Credit,
            source_account: record.source_account_number.clone(),
            destination_account: record.destination_account_number.clone(),
            destination_holder_name: record.destination_account_holder_name.clone(),
            amount: record.amount,
            description: record.description.clone(),
        }
    }

    /// Intake record for the ledger (state `Created`)
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord::new(
            self.transaction_id,
            TransactionOrigin::ExternalBank {
                bank_code: self.sending_bank.clone(),
            },
            self.source_account.clone(),
            self.destination_account.clone(),
            self.destination_holder_name.clone(),
            self.amount,
            self.description.clone(),
        )
    }
}

/// Confirmation returned to the calling bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    /// Transaction ID from the payload (nil when the payload was undecodable)
    pub transaction_id: TransactionId,

    /// Final status
    pub status: StatusCode,
}

impl SettlementResult {
    /// Create result
    pub fn new(transaction_id: TransactionId, status: StatusCode) -> Self {
        Self {
            transaction_id,
            status,
        }
    }

    /// Result mirroring a processed ledger record
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self::new(
            record.transaction_id,
            record.status().unwrap_or(StatusCode::MalformedTransaction),
        )
    }

    /// Refused before touching the ledger
    pub fn malformed(transaction_id: TransactionId) -> Self {
        Self::new(transaction_id, StatusCode::MalformedTransaction)
    }

    /// Whether the counterparty settled the transaction
    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }
}

/// Payload waiting for redelivery
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelivery {
    /// Payload to send
    pub payload: ExternalPayload,

    /// Destination bank code
    pub bank_code: String,

    /// Delivery attempts so far (one per retry-policy run)
    pub attempts: u32,

    /// First time the payload was parked
    pub parked_at: DateTime<Utc>,

    /// Last failure
    pub last_error: String,
}

/// Outcome of one redelivery run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeliveryReport {
    /// Payloads tried
    pub attempted: usize,

    /// Payloads confirmed by their counterparty
    pub delivered: usize,

    /// Payloads still parked
    pub still_pending: usize,
}

/// Deterministic ID for the refund of a delivery the counterparty refused
///
/// Derived from the original ID so that repeated refusals refund once.
pub fn reversal_id(transaction_id: TransactionId) -> TransactionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"reversal:");
    hasher.update(transaction_id.as_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ExternalPayload {
        ExternalPayload {
            transaction_id: Uuid::now_v7(),
            sending_bank: "OTHR".to_string(),
            direction: Direction::Credit,
            source_account: "DE44OTHR0000000009".to_string(),
            destination_account: "NL01BANK0000000001".to_string(),
            destination_holder_name: "J. Jansen".to_string(),
            amount: Decimal::new(1250, 2),
            description: "Invoice 42".to_string(),
        }
    }

    #[test]
    fn test_payload_to_record() {
        let payload = payload();
        let record = payload.to_record();
        assert_eq!(record.transaction_id, payload.transaction_id);
        assert_eq!(
            record.origin,
            TransactionOrigin::ExternalBank {
                bank_code: "OTHR".to_string()
            }
        );
        assert!(!record.processed());
    }

    #[test]
    fn test_json_wire_format() {
        let payload = payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["direction"], "CREDIT");
        assert_eq!(json["amount"], "12.50");

        let result = SettlementResult::new(payload.transaction_id, StatusCode::LimitExceeded);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["status"], "LIMIT_EXCEEDED");
    }

    #[test]
    fn test_reversal_id_is_deterministic() {
        let id = Uuid::now_v7();
        assert_eq!(reversal_id(id), reversal_id(id));
        assert_ne!(reversal_id(id), id);
        assert_ne!(reversal_id(id), reversal_id(Uuid::now_v7()));
    }
}
