//! Reconciliation and tree-integrity auditor.
//!
//! Runs independently of the purchase flow. Every check produces structured
//! findings; only wallet drift within the configured cap is repaired, by a
//! ledger-only correction entry that brings the ledger sum back to the
//! wallet balance.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use tierflow_types::math::safe_sub;
use tierflow_types::{
    CategoryTally, CheckCategory, EngineResult, EntryType, Finding, FindingKind, HealthReport, KycStatus, Participant,
    ParticipantId, RefKey, TierLadder, TreeNode, HEALTH_WEIGHT_FLAGS, HEALTH_WEIGHT_SLOTS, HEALTH_WEIGHT_TREE,
    HEALTH_WEIGHT_WALLETS, MAX_CHILDREN, MAX_UPLINE_DEPTH,
};

use crate::services::eligibility::monthly_total;
use crate::services::ledger::{credit, Credit};
use crate::services::placement::parent_chain;
use crate::services::teams::expected_total;
use crate::store::UnitOfWork;

#[derive(Debug, Clone)]
pub struct Auditor {
    ladder: TierLadder,
    auto_correct_cap: i64,
    min_monthly_purchase: i64,
}

impl Auditor {
    pub fn new(ladder: TierLadder, auto_correct_cap: i64, min_monthly_purchase: i64) -> Self {
        Self { ladder, auto_correct_cap, min_monthly_purchase }
    }

    /// Run every check, write allowed corrections and store the report
    pub fn run(&self, uow: &mut dyn UnitOfWork, now: DateTime<Utc>) -> EngineResult<HealthReport> {
        let run_id = Uuid::new_v4();
        let participants = uow.participants()?;
        let nodes = uow.tree_nodes()?;

        let mut findings = Vec::new();
        let wallets = self.check_wallets(uow, run_id, &participants, now, &mut findings)?;
        let tree = check_tree(uow, &nodes, &mut findings)?;
        let slots = check_slots(&nodes, &mut findings);
        let flags = self.check_flags(uow, &participants, &mut findings)?;

        let score = wallets.weighted(HEALTH_WEIGHT_WALLETS)
            + tree.weighted(HEALTH_WEIGHT_TREE)
            + slots.weighted(HEALTH_WEIGHT_SLOTS)
            + flags.weighted(HEALTH_WEIGHT_FLAGS);
        let corrections = findings.iter().filter(|f| f.corrected).count();

        let report = HealthReport {
            run_id,
            ran_at: now,
            score: score.round().clamp(0.0, 100.0) as u8,
            wallets,
            tree,
            slots,
            flags,
            findings,
            corrections,
        };
        uow.append_health_report(report.clone())?;

        let unresolved = report.unresolved().count();
        if unresolved > 0 {
            warn!(run = %run_id, score = report.score, unresolved, corrections, "reconciliation found issues");
        } else {
            info!(run = %run_id, score = report.score, corrections, "reconciliation clean");
        }
        Ok(report)
    }

    fn check_wallets(
        &self,
        uow: &mut dyn UnitOfWork,
        run_id: Uuid,
        participants: &[Participant],
        now: DateTime<Utc>,
        findings: &mut Vec<Finding>,
    ) -> EngineResult<CategoryTally> {
        let totals = uow.ledger_totals()?;
        let mut tally = CategoryTally::default();

        for participant in participants {
            let ledger_sum = totals.get(&participant.id).copied().unwrap_or(0);
            let drift = safe_sub(participant.wallet_balance, ledger_sum)?;
            if drift == 0 {
                tally.record(true);
                continue;
            }

            let corrected = drift.unsigned_abs() <= self.auto_correct_cap.unsigned_abs();
            if corrected {
                credit(
                    uow,
                    Credit::to(participant.id, drift, EntryType::Correction, RefKey::correction(run_id, participant.id))
                        .described(format!("reconcile ledger to wallet {}", participant.wallet_balance)),
                    now,
                )?;
                warn!(participant = %participant.id, drift, "wallet drift auto-corrected");
            } else {
                warn!(participant = %participant.id, drift, cap = self.auto_correct_cap, "wallet drift above correction cap");
            }

            tally.record(corrected);
            findings.push(Finding {
                category: CheckCategory::Wallets,
                participant: participant.id,
                kind: FindingKind::WalletDrift { wallet: participant.wallet_balance, ledger_sum },
                corrected,
            });
        }
        Ok(tally)
    }

    fn check_flags(
        &self,
        uow: &dyn UnitOfWork,
        participants: &[Participant],
        findings: &mut Vec<Finding>,
    ) -> EngineResult<CategoryTally> {
        let mut tally = CategoryTally::default();

        for participant in participants {
            let mut kinds = Vec::new();

            let earned = self.ladder.tier_for(participant.total_team_count);
            let tier_backed = if participant.tier_overridden {
                participant.tier >= earned
            } else {
                participant.tier == earned
            };
            if !tier_backed {
                kinds.push(FindingKind::TierNotBacked { tier: participant.tier.get(), expected: earned.get() });
            }

            let sealed = uow.teams_led_by(participant.id)?.iter().filter(|t| t.is_sealed()).count() as u32;
            if sealed != participant.direct_team_count {
                kinds.push(FindingKind::TeamCountMismatch { recorded: participant.direct_team_count, expected: sealed });
            }
            let total = expected_total(uow, participant)?;
            if total != participant.total_team_count {
                kinds.push(FindingKind::TeamCountMismatch { recorded: participant.total_team_count, expected: total });
            }

            if participant.monthly_eligible && !self.eligibility_backed(uow, participant)? {
                kinds.push(FindingKind::EligibilityNotBacked);
            }

            if participant.referral_code.is_some() && participant.first_purchase_at.is_none() {
                kinds.push(FindingKind::ReferralCodeWithoutPurchase);
            }

            tally.record(kinds.is_empty());
            findings.extend(kinds.into_iter().map(|kind| Finding {
                category: CheckCategory::Flags,
                participant: participant.id,
                kind,
                corrected: false,
            }));
        }
        Ok(tally)
    }

    fn eligibility_backed(&self, uow: &dyn UnitOfWork, participant: &Participant) -> EngineResult<bool> {
        let Some(period) = participant.eligibility_period else {
            return Ok(false);
        };
        Ok(participant.kyc_status == KycStatus::Verified
            && monthly_total(uow, participant.id, period)? >= self.min_monthly_purchase)
    }
}

fn check_tree(uow: &dyn UnitOfWork, nodes: &[TreeNode], findings: &mut Vec<Finding>) -> EngineResult<CategoryTally> {
    let placed: BTreeSet<ParticipantId> = nodes.iter().map(|n| n.participant).collect();
    let mut tally = CategoryTally::default();

    for node in nodes {
        let mut kinds = Vec::new();

        if let Some(parent) = node.parent {
            if !placed.contains(&parent) {
                kinds.push(FindingKind::MissingParent { parent });
            }
        }
        if has_self_ancestry(uow, node.participant, nodes.len())? {
            kinds.push(FindingKind::SelfAncestry);
        }

        let actual = parent_chain(uow, node.participant, MAX_UPLINE_DEPTH)?;
        let indexed: BTreeMap<u8, ParticipantId> =
            uow.ancestors(node.participant)?.into_iter().map(|row| (row.depth, row.ancestor)).collect();
        let mismatch = (1..=MAX_UPLINE_DEPTH as u8).find_map(|depth| {
            let expected = actual.get(depth as usize - 1).copied();
            let found = indexed.get(&depth).copied();
            (expected != found).then_some(FindingKind::AncestorIndexMismatch { depth, indexed: found, actual: expected })
        });
        kinds.extend(mismatch);

        tally.record(kinds.is_empty());
        findings.extend(kinds.into_iter().map(|kind| Finding {
            category: CheckCategory::Tree,
            participant: node.participant,
            kind,
            corrected: false,
        }));
    }
    Ok(tally)
}

/// True if walking parent links from `participant` comes back to it
fn has_self_ancestry(uow: &dyn UnitOfWork, participant: ParticipantId, limit: usize) -> EngineResult<bool> {
    let mut current = uow.tree_node(participant)?.and_then(|n| n.parent);
    let mut steps = 0;
    while let Some(id) = current {
        if id == participant {
            return Ok(true);
        }
        steps += 1;
        if steps > limit {
            // Looping above this node without passing through it.
            return Ok(false);
        }
        current = uow.tree_node(id)?.and_then(|n| n.parent);
    }
    Ok(false)
}

fn check_slots(nodes: &[TreeNode], findings: &mut Vec<Finding>) -> CategoryTally {
    let mut by_parent: BTreeMap<ParticipantId, Vec<&TreeNode>> = BTreeMap::new();
    for node in nodes {
        if let Some(parent) = node.parent {
            by_parent.entry(parent).or_default().push(node);
        }
    }

    let mut tally = CategoryTally::default();
    for node in nodes {
        let mut kinds = Vec::new();
        if !node.slot_in_bounds() {
            kinds.push(FindingKind::SlotOutOfBounds { slot: node.slot });
        }
        if let Some(parent) = node.parent {
            let siblings = &by_parent[&parent];
            let sharing = siblings.iter().filter(|s| s.slot == node.slot).count();
            if sharing > 1 {
                kinds.push(FindingKind::DuplicateSlot { parent, slot: node.slot });
            }
        }
        tally.record(kinds.is_empty());
        findings.extend(kinds.into_iter().map(|kind| Finding {
            category: CheckCategory::Slots,
            participant: node.participant,
            kind,
            corrected: false,
        }));
    }

    for (parent, children) in &by_parent {
        let passed = children.len() <= MAX_CHILDREN;
        tally.record(passed);
        if !passed {
            findings.push(Finding {
                category: CheckCategory::Slots,
                participant: *parent,
                kind: FindingKind::TooManyChildren { count: children.len() },
                corrected: false,
            });
        }
    }
    tally
}
