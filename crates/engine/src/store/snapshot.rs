//! Serializable image of the memory store.
//!
//! Secondary indexes (referral codes, slots, ledger ref keys) are not stored;
//! they are rebuilt on import, which also re-checks their uniqueness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierflow_types::{
    DistributionResult, EngineError, EngineResult, HealthReport, Installment, JobRun, LedgerEntry, Participant,
    Pool, PromotionRecord, Purchase, Sequence, Team, TreeNode, Withdrawal, AncestorRow,
};

use super::memory::Tables;

/// A purchase together with the result it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPurchase {
    pub purchase: Purchase,
    pub result: DistributionResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: Option<DateTime<Utc>>,
    pub sequences: Vec<(Sequence, u64)>,
    pub participants: Vec<Participant>,
    pub tree: Vec<TreeNode>,
    pub ancestors: Vec<AncestorRow>,
    pub purchases: Vec<StoredPurchase>,
    pub ledger: Vec<LedgerEntry>,
    pub installments: Vec<Installment>,
    pub teams: Vec<Team>,
    pub promotions: Vec<PromotionRecord>,
    pub pools: Vec<Pool>,
    pub withdrawals: Vec<Withdrawal>,
    pub job_runs: Vec<JobRun>,
    pub health_reports: Vec<HealthReport>,
}

impl Snapshot {
    pub(crate) fn from_tables(tables: &Tables) -> Self {
        Self {
            taken_at: Some(Utc::now()),
            sequences: tables.sequences.iter().map(|(k, v)| (*k, *v)).collect(),
            participants: tables.participants.values().cloned().collect(),
            tree: tables.tree.values().cloned().collect(),
            ancestors: tables
                .ancestors
                .iter()
                .map(|(&(descendant, depth), &ancestor)| AncestorRow { ancestor, descendant, depth })
                .collect(),
            purchases: tables.stored_purchases(),
            ledger: tables.ledger.values().cloned().collect(),
            installments: tables.installments.values().cloned().collect(),
            teams: tables.teams.values().cloned().collect(),
            promotions: tables.promotions.values().cloned().collect(),
            pools: tables.pools.values().cloned().collect(),
            withdrawals: tables.withdrawals.values().cloned().collect(),
            job_runs: tables.job_runs.values().cloned().collect(),
            health_reports: tables.health_reports.values().cloned().collect(),
        }
    }

    pub(crate) fn into_tables(self) -> EngineResult<Tables> {
        let mut tables = Tables::default();
        tables.sequences = self.sequences.into_iter().collect();

        for participant in self.participants {
            if let Some(code) = &participant.referral_code {
                if tables.referral_codes.insert(code.clone(), participant.id).is_some() {
                    return Err(EngineError::Integrity(format!("duplicate referral code {} in snapshot", code)));
                }
            }
            tables.participants.insert(participant.id, participant);
        }

        for node in self.tree {
            if let Some(parent) = node.parent {
                if tables.slots.insert((parent, node.slot), node.participant).is_some() {
                    return Err(EngineError::Integrity(format!(
                        "duplicate slot {} under {} in snapshot",
                        node.slot, parent
                    )));
                }
            }
            tables.tree.insert(node.participant, node);
        }

        for row in self.ancestors {
            tables.ancestors.insert((row.descendant, row.depth), row.ancestor);
        }

        for stored in self.purchases {
            tables.distributions.insert(stored.purchase.id, stored.result);
            tables.purchases.insert(stored.purchase.id, stored.purchase);
        }

        for entry in self.ledger {
            if tables.ledger_refs.insert(entry.ref_key.clone(), entry.seq).is_some() {
                return Err(EngineError::Integrity(format!("duplicate ref key {} in snapshot", entry.ref_key)));
            }
            tables.ledger.insert(entry.seq, entry);
        }

        tables.installments = self.installments.into_iter().map(|i| (i.key, i)).collect();
        tables.teams = self.teams.into_iter().map(|t| (t.id, t)).collect();
        tables.promotions = (1u64..).zip(self.promotions).collect();
        tables.pools = self.pools.into_iter().map(|p| (p.id, p)).collect();
        tables.withdrawals = self.withdrawals.into_iter().map(|w| (w.id, w)).collect();
        tables.job_runs = (1u64..).zip(self.job_runs).collect();
        tables.health_reports = (1u64..).zip(self.health_reports).collect();

        Ok(tables)
    }
}
