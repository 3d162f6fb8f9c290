//! # Idempotency and Fail-Closed Tests

mod common;

use chrono::Duration;
use common::Harness;
use tierflow_types::{EngineError, EntryType, InstallmentState, JobStatus, PaidPurchase, ParticipantId, PurchaseId};

#[test]
fn test_redelivered_purchase_writes_nothing() {
    let mut h = Harness::new();
    h.join(1, None, 20_000);
    h.register(2, Some(1));
    let purchase = h.next_purchase_for(2, 20_000);

    let first = h.engine.on_purchase_paid(&purchase).unwrap();
    let entries = h.ledger_len();
    let wallet = h.wallet(1);

    let replay = h.engine.on_purchase_paid(&purchase).unwrap();
    assert!(replay.replayed);
    assert!(!first.replayed);
    assert_eq!(replay.level_credits, first.level_credits);
    assert_eq!(h.ledger_len(), entries);
    assert_eq!(h.wallet(1), wallet);
    assert_eq!(h.engine.installments(ParticipantId(2)).unwrap().len(), 4);
}

#[test]
fn test_reused_purchase_id_with_other_amount_rejected() {
    let mut h = Harness::new();
    h.register(1, None);
    let purchase = h.next_purchase_for(1, 20_000);
    h.engine.on_purchase_paid(&purchase).unwrap();

    let altered = PaidPurchase { amount: 25_000, ..purchase };
    let result = h.engine.on_purchase_paid(&altered);
    assert!(matches!(result, Err(EngineError::Validation { .. })));
}

#[test]
fn test_rejected_purchase_leaves_no_state() {
    let h = Harness::new();
    h.register(1, None);
    let purchase = PaidPurchase { id: PurchaseId(1), participant: ParticipantId(1), amount: -5, paid_at: h.clock };

    assert!(h.engine.on_purchase_paid(&purchase).is_err());
    assert_eq!(h.ledger_len(), 0);
    assert!(h.engine.tree_node(ParticipantId(1)).unwrap().is_none());
    assert!(h.engine.open_pool().unwrap().is_none());
}

#[test]
fn test_unknown_buyer_rejected() {
    let h = Harness::new();
    let purchase = PaidPurchase { id: PurchaseId(1), participant: ParticipantId(404), amount: 100, paid_at: h.clock };
    assert_eq!(
        h.engine.on_purchase_paid(&purchase),
        Err(EngineError::UnknownParticipant(ParticipantId(404)))
    );
}

#[test]
fn test_settlement_pays_each_installment_once() {
    let mut h = Harness::new();
    h.join(1, None, 20_000);
    for id in 2..=4 {
        h.join(id, Some(1), 20_000);
    }

    let later = h.clock + Duration::days(30);
    let first = h.engine.run_installment_settlement(later).unwrap();
    let second = h.engine.run_installment_settlement(later).unwrap();

    assert_eq!(first.status, JobStatus::Success);
    // The root's four installments; the children have no children yet.
    let paid = h.engine.installments_in_state(InstallmentState::Paid).unwrap();
    assert_eq!(paid.len(), 4);
    assert!(paid.iter().all(|i| i.participant == ParticipantId(1)));
    assert_eq!(second.processed, 12, "children's installments stay pending");

    let payouts = h
        .engine
        .ledger(Some(ParticipantId(1)))
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::SelfIncomePayout)
        .count();
    assert_eq!(payouts, 4);
}
