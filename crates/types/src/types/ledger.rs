//! # Ledger Types
//!
//! Append-only signed-amount records. A participant's entries always sum to
//! their wallet balance; entries with no participant belong to the company.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ids::{Amount, ParticipantId, PoolId, PurchaseId, WithdrawalId};
use crate::types::participant::Tier;

/// Ledger entry tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    CompanyShare,
    LevelCommission,
    UnusedLevels,
    SelfIncomePayout,
    PoolContribution,
    PoolShare,
    PoolRetained,
    Withdrawal,
    Correction,
}

impl EntryType {
    /// Correction entries are written to the ledger without moving the wallet
    pub fn moves_wallet(self) -> bool {
        !matches!(self, EntryType::Correction)
    }
}

/// One immutable ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    /// `None` = company ledger
    pub participant: Option<ParticipantId>,
    pub amount: Amount,
    pub entry_type: EntryType,
    /// Unique per logical event; guards against double-crediting on retry
    pub ref_key: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Builders for idempotency keys, one per logical money movement
pub struct RefKey;

impl RefKey {
    pub fn company_share(purchase: PurchaseId) -> String {
        format!("{}:company", purchase)
    }

    pub fn level(purchase: PurchaseId, depth: u8) -> String {
        format!("{}:L{}", purchase, depth)
    }

    pub fn unused_levels(purchase: PurchaseId) -> String {
        format!("{}:unused", purchase)
    }

    pub fn pool_contribution(purchase: PurchaseId) -> String {
        format!("{}:pool", purchase)
    }

    pub fn installment(purchase: PurchaseId, sequence: u8) -> String {
        format!("{}:SI{}", purchase, sequence)
    }

    pub fn pool_share(pool: PoolId, tier: Tier, participant: ParticipantId) -> String {
        format!("{}:T{}:{}", pool, tier.get(), participant)
    }

    pub fn pool_retained(pool: PoolId, tier: Tier) -> String {
        format!("{}:T{}:retained", pool, tier.get())
    }

    pub fn withdrawal(withdrawal: WithdrawalId) -> String {
        format!("{}:debit", withdrawal)
    }

    pub fn correction(audit_run: impl fmt::Display, participant: ParticipantId) -> String {
        format!("audit:{}:{}", audit_run, participant)
    }
}

/// Result of a credit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// A new entry was appended
    Applied(LedgerEntry),
    /// An entry with the same ref key already exists; nothing was written
    Duplicate(LedgerEntry),
}

impl CreditOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            CreditOutcome::Applied(entry) | CreditOutcome::Duplicate(entry) => entry,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CreditOutcome::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_keys() {
        assert_eq!(RefKey::level(PurchaseId(17), 3), "O17:L3");
        assert_eq!(RefKey::installment(PurchaseId(17), 4), "O17:SI4");
        assert_eq!(
            RefKey::pool_share(PoolId(2), Tier::new(3).unwrap(), ParticipantId(9)),
            "pool2:T3:P9"
        );
        assert_eq!(RefKey::pool_retained(PoolId(2), Tier::new(4).unwrap()), "pool2:T4:retained");
    }

    #[test]
    fn test_correction_does_not_move_wallet() {
        assert!(!EntryType::Correction.moves_wallet());
        assert!(EntryType::LevelCommission.moves_wallet());
    }
}
