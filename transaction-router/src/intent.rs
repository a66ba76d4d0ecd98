//! Front-end requests and replies

use ledger_core::{
    AccountNumber, BankIdentity, StatusCode, TransactionId, TransactionOrigin, TransactionRecord,
    CASH_ACCOUNT,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a customer asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionIntent {
    /// Move money from a local account to any account
    Transfer {
        /// Account debited (must be held here)
        source_account: String,
        /// Account credited (local or at a peer bank)
        destination_account: String,
        /// Holder name as entered by the customer
        destination_holder_name: String,
        /// Amount (strictly positive)
        amount: Decimal,
        /// Free text
        #[serde(default)]
        description: String,
    },

    /// Cash paid in at a desk or ATM
    Deposit {
        /// Account credited
        account: String,
        /// Amount (strictly positive)
        amount: Decimal,
        /// Free text
        #[serde(default)]
        description: String,
    },

    /// Cash taken out at a desk or ATM
    Withdrawal {
        /// Account debited
        account: String,
        /// Amount (strictly positive)
        amount: Decimal,
        /// Free text
        #[serde(default)]
        description: String,
    },
}

impl TransactionIntent {
    /// Transfer intent
    pub fn transfer(
        source_account: impl Into<String>,
        destination_account: impl Into<String>,
        destination_holder_name: impl Into<String>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        TransactionIntent::Transfer {
            source_account: source_account.into(),
            destination_account: destination_account.into(),
            destination_holder_name: destination_holder_name.into(),
            amount,
            description: description.into(),
        }
    }

    /// Cash deposit intent
    pub fn deposit(account: impl Into<String>, amount: Decimal) -> Self {
        TransactionIntent::Deposit {
            account: account.into(),
            amount,
            description: "Cash deposit".to_string(),
        }
    }

    /// Cash withdrawal intent
    pub fn withdrawal(account: impl Into<String>, amount: Decimal) -> Self {
        TransactionIntent::Withdrawal {
            account: account.into(),
            amount,
            description: "Cash withdrawal".to_string(),
        }
    }

    /// Amount moved
    pub fn amount(&self) -> Decimal {
        match self {
            TransactionIntent::Transfer { amount, .. }
            | TransactionIntent::Deposit { amount, .. }
            | TransactionIntent::Withdrawal { amount, .. } => *amount,
        }
    }

    /// Structural checks done before the ledger sees anything.
    ///
    /// Existence of accounts is the ledger's call, not ours.
    pub fn validate(&self, bank: &BankIdentity) -> Result<(), String> {
        if self.amount() <= Decimal::ZERO {
            return Err(format!("Amount must be positive, got {}", self.amount()));
        }

        match self {
            TransactionIntent::Transfer {
                source_account,
                destination_account,
                ..
            } => {
                check_number(source_account)?;
                check_number(destination_account)?;
                if source_account == destination_account {
                    return Err("Source and destination are the same account".to_string());
                }
                if !bank.is_local(source_account) {
                    return Err(format!("Source {} is not held at this bank", source_account));
                }
                Ok(())
            }
            TransactionIntent::Deposit { account, .. }
            | TransactionIntent::Withdrawal { account, .. } => {
                check_number(account)?;
                if !bank.is_local(account) {
                    return Err(format!("Account {} is not held at this bank", account));
                }
                Ok(())
            }
        }
    }

    /// Build the intake record (state `Created`)
    pub fn to_record(&self, transaction_id: TransactionId) -> TransactionRecord {
        match self {
            TransactionIntent::Transfer {
                source_account,
                destination_account,
                destination_holder_name,
                amount,
                description,
            } => TransactionRecord::new(
                transaction_id,
                TransactionOrigin::Customer,
                source_account.as_str(),
                destination_account.as_str(),
                destination_holder_name.as_str(),
                *amount,
                description.as_str(),
            ),
            TransactionIntent::Deposit {
                account,
                amount,
                description,
            } => TransactionRecord::new(
                transaction_id,
                TransactionOrigin::Customer,
                CASH_ACCOUNT,
                account.as_str(),
                "",
                *amount,
                description.as_str(),
            ),
            TransactionIntent::Withdrawal {
                account,
                amount,
                description,
            } => TransactionRecord::new(
                transaction_id,
                TransactionOrigin::Customer,
                account.as_str(),
                CASH_ACCOUNT,
                CASH_ACCOUNT,
                *amount,
                description.as_str(),
            ),
        }
    }
}

fn check_number(number: &str) -> Result<(), String> {
    if AccountNumber::is_well_formed(number) {
        Ok(())
    } else {
        Err(format!("Malformed account number '{}'", number))
    }
}

/// Submission from a front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Caller-chosen ID; resubmitting with the same ID is idempotent
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,

    /// Requested operation
    pub intent: TransactionIntent,
}

impl SubmitRequest {
    /// Request with a router-assigned ID
    pub fn new(intent: TransactionIntent) -> Self {
        Self {
            transaction_id: None,
            intent,
        }
    }

    /// Request with a caller-chosen ID
    pub fn with_id(transaction_id: TransactionId, intent: TransactionIntent) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            intent,
        }
    }
}

/// Terminal reply to the originator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReply {
    /// Transaction ID
    pub transaction_id: TransactionId,

    /// Final status
    pub status: StatusCode,
}

impl SubmitReply {
    /// Create reply
    pub fn new(transaction_id: TransactionId, status: StatusCode) -> Self {
        Self {
            transaction_id,
            status,
        }
    }

    /// Reply for a processed ledger record
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self::new(
            record.transaction_id,
            record.status().unwrap_or(StatusCode::MalformedTransaction),
        )
    }

    /// Whether the transaction settled
    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn bank() -> BankIdentity {
        BankIdentity::new("NL", "BANK")
    }

    #[test]
    fn test_valid_transfer() {
        let intent = TransactionIntent::transfer(
            "NL01BANK0000000001",
            "DE44OTHR0000000009",
            "M. Muller",
            Decimal::from(10),
            "Rent",
        );
        assert!(intent.validate(&bank()).is_ok());

        let record = intent.to_record(Uuid::from_u128(7));
        assert_eq!(record.source_account_number, "NL01BANK0000000001");
        assert_eq!(record.destination_account_number, "DE44OTHR0000000009");
        assert!(!record.processed());
    }

    #[test]
    fn test_rejects_bad_amounts() {
        for amount in [Decimal::ZERO, Decimal::from(-5)] {
            let intent = TransactionIntent::deposit("NL01BANK0000000001", amount);
            assert!(intent.validate(&bank()).is_err());
        }
    }

    #[test]
    fn test_rejects_same_account_and_foreign_source() {
        let same = TransactionIntent::transfer(
            "NL01BANK0000000001",
            "NL01BANK0000000001",
            "X",
            Decimal::ONE,
            "",
        );
        assert!(same.validate(&bank()).is_err());

        let foreign = TransactionIntent::transfer(
            "DE44OTHR0000000009",
            "NL01BANK0000000001",
            "X",
            Decimal::ONE,
            "",
        );
        assert!(foreign.validate(&bank()).is_err());

        let cash = TransactionIntent::transfer(CASH_ACCOUNT, "NL01BANK0000000001", "X", Decimal::ONE, "");
        assert!(cash.validate(&bank()).is_err());
    }

    #[test]
    fn test_cash_intents_use_cash_account() {
        let deposit = TransactionIntent::deposit("NL01BANK0000000001", Decimal::from(3));
        assert_eq!(deposit.to_record(Uuid::nil()).source_account_number, CASH_ACCOUNT);

        let withdrawal = TransactionIntent::withdrawal("NL01BANK0000000001", Decimal::from(3));
        assert_eq!(
            withdrawal.to_record(Uuid::nil()).destination_account_number,
            CASH_ACCOUNT
        );
    }

    #[test]
    fn test_intent_json_shape() {
        let json = r#"{
            "intent": {
                "type": "TRANSFER",
                "source_account": "NL01BANK0000000001",
                "destination_account": "NL02BANK0000000002",
                "destination_holder_name": "P. de Vries",
                "amount": "12.50"
            }
        }"#;
        let request: SubmitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.transaction_id, None);
        assert_eq!(request.intent.amount(), Decimal::new(1250, 2));
    }
}
