//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Floor: no balance ever drops below -overdraft_limit
//! - Conservation: local balances change only by cash and cross-bank flows
//! - Idempotency: replaying a transaction ID never moves money again
//! - History: every settled transaction shows up on each local side

use ledger_core::{
    AccountLedger, Config, OpenAccountRequest, TransactionOrigin, TransactionRecord,
    CASH_ACCOUNT,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const LOCAL: [&str; 3] = [
    "NL01BANK0000000001",
    "NL02BANK0000000002",
    "NL03BANK0000000003",
];
const FOREIGN: &str = "DE44OTHR0000000009";

/// One side of a generated transaction
#[derive(Debug, Clone, Copy)]
enum Side {
    Local(usize),
    Cash,
    Foreign,
}

impl Side {
    fn number(&self) -> &'static str {
        match self {
            Side::Local(i) => LOCAL[*i],
            Side::Cash => CASH_ACCOUNT,
            Side::Foreign => FOREIGN,
        }
    }
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![
        6 => (0usize..LOCAL.len()).prop_map(Side::Local),
        2 => Just(Side::Cash),
        1 => Just(Side::Foreign),
    ]
}

/// Strategy for generating amounts (cents, occasionally non-positive)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        20 => (1i64..50_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        1 => (-500i64..=0i64).prop_map(|cents| Decimal::new(cents, 2)),
    ]
}

fn transfer_strategy() -> impl Strategy<Value = (Side, Side, Decimal)> {
    (side_strategy(), side_strategy(), amount_strategy())
}

fn record(source: Side, destination: Side, amount: Decimal) -> TransactionRecord {
    let origin = match source {
        Side::Foreign => TransactionOrigin::ExternalBank {
            bank_code: "OTHR".to_string(),
        },
        _ => TransactionOrigin::Customer,
    };
    TransactionRecord::new(
        Uuid::now_v7(),
        origin,
        source.number(),
        destination.number(),
        "Holder",
        amount,
        "generated",
    )
}

fn create_test_ledger(overdraft: i64) -> AccountLedger {
    let ledger = AccountLedger::open(&Config::default()).unwrap();
    for number in LOCAL {
        ledger
            .open_account_with(
                OpenAccountRequest::new("Holder")
                    .with_number(number)
                    .with_overdraft_limit(Decimal::from(overdraft))
                    .with_transfer_limit(Decimal::from(300)),
            )
            .unwrap();
    }
    ledger
}

fn total(ledger: &AccountLedger) -> Decimal {
    LOCAL.iter().map(|n| ledger.get_balance(n).unwrap()).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: balances never drop below the floor
    #[test]
    fn prop_floor_holds(
        overdraft in 0i64..100,
        transfers in prop::collection::vec(transfer_strategy(), 1..60),
    ) {
        let ledger = create_test_ledger(overdraft);

        for (source, destination, amount) in transfers {
            let result = ledger.verify_and_apply(record(source, destination, amount)).unwrap();
            prop_assert!(result.processed());

            for number in LOCAL {
                prop_assert!(ledger.get_balance(number).unwrap() >= Decimal::from(-overdraft));
            }
        }
    }

    /// Property: money enters or leaves only through cash or foreign sides
    #[test]
    fn prop_money_conserved(transfers in prop::collection::vec(transfer_strategy(), 1..60)) {
        let ledger = create_test_ledger(0);
        let mut external_flow = Decimal::ZERO;

        for (source, destination, amount) in transfers {
            let result = ledger.verify_and_apply(record(source, destination, amount)).unwrap();
            if result.successful() {
                if matches!(source, Side::Cash | Side::Foreign) {
                    external_flow += amount;
                }
                if matches!(destination, Side::Cash | Side::Foreign) {
                    external_flow -= amount;
                }
            }
        }

        prop_assert_eq!(total(&ledger), external_flow);
    }

    /// Property: replaying every transaction changes nothing
    #[test]
    fn prop_replay_is_idempotent(transfers in prop::collection::vec(transfer_strategy(), 1..40)) {
        let ledger = create_test_ledger(0);

        let mut applied = Vec::new();
        for (source, destination, amount) in transfers {
            let tx = record(source, destination, amount);
            let result = ledger.verify_and_apply(tx.clone()).unwrap();
            applied.push((tx, result));
        }

        let balances: Vec<Decimal> = LOCAL.iter().map(|n| ledger.get_balance(n).unwrap()).collect();
        let history: Vec<usize> = LOCAL.iter().map(|n| ledger.get_history(n).unwrap().len()).collect();

        for (tx, first) in applied {
            let replay = ledger.verify_and_apply(tx).unwrap();
            prop_assert_eq!(replay, first);
        }

        let after: Vec<Decimal> = LOCAL.iter().map(|n| ledger.get_balance(n).unwrap()).collect();
        let history_after: Vec<usize> = LOCAL.iter().map(|n| ledger.get_history(n).unwrap().len()).collect();
        prop_assert_eq!(balances, after);
        prop_assert_eq!(history, history_after);
    }

    /// Property: each settled transaction is in the history of its local sides
    #[test]
    fn prop_settled_in_history(transfers in prop::collection::vec(transfer_strategy(), 1..40)) {
        let ledger = create_test_ledger(0);

        let mut settled = Vec::new();
        for (source, destination, amount) in transfers {
            let result = ledger.verify_and_apply(record(source, destination, amount)).unwrap();
            if result.successful() {
                settled.push((source, destination, result.transaction_id));
            }
        }

        for (source, destination, id) in settled {
            for side in [source, destination] {
                if let Side::Local(i) = side {
                    let history = ledger.get_history(LOCAL[i]).unwrap();
                    prop_assert!(history.iter().any(|r| r.transaction_id == id));
                }
            }
        }
    }
}

#[test]
fn test_parallel_transfers_conserve_money() {
    let ledger = Arc::new(create_test_ledger(0));
    for i in 0..LOCAL.len() {
        ledger
            .verify_and_apply(record(Side::Cash, Side::Local(i), Decimal::from(200)))
            .unwrap();
    }

    let workers: Vec<_> = (0..6)
        .map(|w| {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let source = Side::Local((w + i) % LOCAL.len());
                    let destination = Side::Local((w + i + 1) % LOCAL.len());
                    let result = ledger
                        .verify_and_apply(record(source, destination, Decimal::new(1750, 2)))
                        .unwrap();
                    assert!(result.processed());
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(total(&ledger), Decimal::from(600));
    for number in LOCAL {
        assert!(ledger.get_balance(number).unwrap() >= Decimal::ZERO);
    }
}
