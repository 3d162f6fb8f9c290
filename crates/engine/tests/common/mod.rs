//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

pub mod faults;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tierflow_engine::{EngineConfig, MemoryStore, RewardsEngine};
use tierflow_types::{Amount, DistributionResult, PaidPurchase, ParticipantId, PurchaseId};

/// Shorthand for a verified purchase event
pub fn paid(id: u64, participant: u64, amount: Amount, paid_at: DateTime<Utc>) -> PaidPurchase {
    PaidPurchase { id: PurchaseId(id), participant: ParticipantId(participant), amount, paid_at }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: RewardsEngine<MemoryStore>,
    next_purchase: u64,
    pub clock: DateTime<Utc>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: RewardsEngine::new(MemoryStore::new(), config).unwrap(),
            next_purchase: 1,
            clock: start(),
        }
    }

    pub fn register(&self, id: u64, sponsor: Option<u64>) {
        self.engine
            .register_participant(ParticipantId(id), sponsor.map(ParticipantId), self.clock)
            .unwrap();
    }

    /// Register `id` under `sponsor` and make a first purchase
    pub fn join(&mut self, id: u64, sponsor: Option<u64>, amount: Amount) -> DistributionResult {
        self.register(id, sponsor);
        self.buy(id, amount)
    }

    pub fn buy(&mut self, id: u64, amount: Amount) -> DistributionResult {
        let purchase = self.next_purchase_for(id, amount);
        self.engine.on_purchase_paid(&purchase).unwrap()
    }

    pub fn next_purchase_for(&mut self, id: u64, amount: Amount) -> PaidPurchase {
        let purchase = PaidPurchase {
            id: PurchaseId(self.next_purchase),
            participant: ParticipantId(id),
            amount,
            paid_at: self.clock,
        };
        self.next_purchase += 1;
        self.clock = self.clock + Duration::minutes(1);
        purchase
    }

    pub fn wallet(&self, id: u64) -> Amount {
        self.engine.participant(ParticipantId(id)).unwrap().wallet_balance
    }

    /// Every ledger entry, company and participants
    pub fn ledger_len(&self) -> usize {
        self.engine.store().snapshot().ledger.len()
    }
}
