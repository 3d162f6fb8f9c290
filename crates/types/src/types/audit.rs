//! # Reconciliation Types
//!
//! Findings are data, never errors. Each carries its category so the health
//! score can weight it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ids::{Amount, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckCategory {
    /// Wallet balance equals the sum of ledger entries
    Wallets,
    /// Parent validity, no self-ancestry, ancestor index matches the chain
    Tree,
    /// Slot bounds and uniqueness under a parent
    Slots,
    /// Tier, team-count, eligibility and referral-code flags are backed
    Flags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FindingKind {
    WalletDrift { wallet: Amount, ledger_sum: Amount },
    MissingParent { parent: ParticipantId },
    SelfAncestry,
    AncestorIndexMismatch { depth: u8, indexed: Option<ParticipantId>, actual: Option<ParticipantId> },
    SlotOutOfBounds { slot: u8 },
    DuplicateSlot { parent: ParticipantId, slot: u8 },
    TooManyChildren { count: usize },
    TierNotBacked { tier: u8, expected: u8 },
    TeamCountMismatch { recorded: u32, expected: u32 },
    EligibilityNotBacked,
    ReferralCodeWithoutPurchase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: CheckCategory,
    pub participant: ParticipantId,
    pub kind: FindingKind,
    /// True when an auto-correction entry was written for this finding
    pub corrected: bool,
}

/// Pass/total counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTally {
    pub checked: u32,
    pub passed: u32,
}

impl CategoryTally {
    pub fn record(&mut self, passed: bool) {
        self.checked += 1;
        if passed {
            self.passed += 1;
        }
    }

    /// weight × passed / checked; an empty category scores full weight
    pub fn weighted(&self, weight: u32) -> f64 {
        if self.checked == 0 {
            return weight as f64;
        }
        weight as f64 * self.passed as f64 / self.checked as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub run_id: Uuid,
    pub ran_at: DateTime<Utc>,
    /// 0..=100
    pub score: u8,
    pub wallets: CategoryTally,
    pub tree: CategoryTally,
    pub slots: CategoryTally,
    pub flags: CategoryTally,
    pub findings: Vec<Finding>,
    pub corrections: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.findings.iter().all(|f| f.corrected)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.corrected)
    }
}
