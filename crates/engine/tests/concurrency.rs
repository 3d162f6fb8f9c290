//! # Concurrent Purchase Tests
//!
//! Many buyers under one sponsor hit the same ancestors at the same time.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use tierflow_engine::{EngineConfig, MemoryStore, RewardsEngine};
use tierflow_types::{PaidPurchase, ParticipantId, PurchaseId, MAX_CHILDREN};

const THREADS: u64 = 8;
const PER_THREAD: u64 = 12;

#[test]
fn test_parallel_first_purchases_keep_tree_and_ledger_consistent() {
    let engine = Arc::new(RewardsEngine::new(MemoryStore::new(), EngineConfig::default()).unwrap());
    let now = common::start();
    engine.register_participant(ParticipantId(1), None, now).unwrap();
    engine
        .on_purchase_paid(&PaidPurchase { id: PurchaseId(1), participant: ParticipantId(1), amount: 20_000, paid_at: now })
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for n in 0..PER_THREAD {
                    let id = 100 + t * PER_THREAD + n;
                    engine.register_participant(ParticipantId(id), Some(ParticipantId(1)), now).unwrap();
                    let result = engine
                        .on_purchase_paid(&PaidPurchase {
                            id: PurchaseId(id),
                            participant: ParticipantId(id),
                            amount: 10_000 + n as i64,
                            paid_at: now,
                        })
                        .unwrap();
                    assert!(result.is_conserved());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = engine.store().snapshot();
    assert_eq!(snapshot.tree.len() as u64, 1 + THREADS * PER_THREAD);

    let mut children: BTreeMap<ParticipantId, usize> = BTreeMap::new();
    for node in &snapshot.tree {
        if let Some(parent) = node.parent {
            *children.entry(parent).or_default() += 1;
        }
    }
    assert!(children.values().all(|count| *count <= MAX_CHILDREN));

    let report = engine.run_reconciliation(now).unwrap();
    assert!(report.findings.is_empty(), "findings: {:?}", report.findings);
    assert_eq!(report.score, 100);
}

#[test]
fn test_parallel_redelivery_credits_once() {
    let engine = Arc::new(RewardsEngine::new(MemoryStore::new(), EngineConfig::default()).unwrap());
    let now = common::start();
    engine.register_participant(ParticipantId(1), None, now).unwrap();
    engine.register_participant(ParticipantId(2), Some(ParticipantId(1)), now).unwrap();
    engine
        .on_purchase_paid(&PaidPurchase { id: PurchaseId(1), participant: ParticipantId(1), amount: 20_000, paid_at: now })
        .unwrap();

    let purchase = PaidPurchase { id: PurchaseId(2), participant: ParticipantId(2), amount: 20_000, paid_at: now };
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let purchase = purchase.clone();
            thread::spawn(move || engine.on_purchase_paid(&purchase).unwrap().replayed)
        })
        .collect();
    let fresh = handles.into_iter().map(|h| h.join().unwrap()).filter(|replayed| !replayed).count();

    assert_eq!(fresh, 1);
    assert_eq!(engine.participant(ParticipantId(1)).unwrap().wallet_balance, 3_500);
}
