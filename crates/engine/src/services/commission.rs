//! Commission distribution engine.
//!
//! One paid purchase becomes, inside a single unit of work: placement of a
//! first-time buyer, the company share, up to five upline level credits,
//! unused levels returned to the company, the pool contribution, the
//! self-income reserve, referral code issuance and team tracking. The stored
//! [`DistributionResult`] doubles as the idempotency record for the purchase.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use tierflow_types::math::bps_share;
use tierflow_types::{
    Amount, DistributionResult, EngineError, EngineResult, EntryType, LevelCredit, PaidPurchase, ParticipantId,
    PoolId, Purchase, PurchaseClass, RefKey, SplitPlan, MAX_UPLINE_DEPTH, REFERRAL_CODE_ATTEMPTS, REFERRAL_CODE_LENGTH,
};

use crate::config::EngineConfig;
use crate::services::ledger::{credit, Credit};
use crate::services::teams::TeamTracker;
use crate::services::{placement, pool, self_income};
use crate::store::{require_participant, UnitOfWork};

/// Splits paid purchases and applies every downstream effect
#[derive(Debug, Clone)]
pub struct Distributor {
    config: EngineConfig,
    teams: TeamTracker,
}

impl Distributor {
    pub fn new(config: EngineConfig, teams: TeamTracker) -> Self {
        Self { config, teams }
    }

    pub fn distribute(&self, uow: &mut dyn UnitOfWork, paid: &PaidPurchase) -> EngineResult<DistributionResult> {
        if paid.amount < self.config.min_qualifying_amount {
            return Err(EngineError::invalid(
                "amount",
                paid.amount,
                &format!("at least {}", self.config.min_qualifying_amount),
            ));
        }
        let buyer = require_participant(uow, paid.participant)?;

        if let Some(mut stored) = uow.distribution(paid.id)? {
            if stored.participant != paid.participant || stored.amount != paid.amount {
                return Err(EngineError::invalid(
                    "purchase",
                    paid.id,
                    &format!("the same buyer and amount as its first delivery ({}, {})", stored.participant, stored.amount),
                ));
            }
            debug!(purchase = %paid.id, "purchase already distributed, replaying stored result");
            stored.replayed = true;
            return Ok(stored);
        }

        let now = paid.paid_at;
        let class = PurchaseClass::classify(uow.purchases_of(paid.participant)?.len());

        let placement = if class == PurchaseClass::First && !buyer.placed {
            Some(placement::place(uow, paid.participant, buyer.sponsor, self.config.root_participant, now)?)
        } else {
            None
        };

        let chain = uow.ancestors(paid.participant)?;
        let plan = SplitPlan::compute(paid.amount, class, chain.len())?;

        credit(
            uow,
            Credit::company(plan.company_share, EntryType::CompanyShare, RefKey::company_share(paid.id))
                .described(format!("company share of {}", paid.id)),
            now,
        )?;

        let mut level_credits = Vec::with_capacity(plan.chain_len);
        for (row, amount) in chain.iter().zip(plan.credited_levels()) {
            if *amount == 0 {
                continue;
            }
            credit(
                uow,
                Credit::to(row.ancestor, *amount, EntryType::LevelCommission, RefKey::level(paid.id, row.depth))
                    .described(format!("level {} commission on {}", row.depth, paid.id)),
                now,
            )?;
            level_credits.push(LevelCredit { depth: row.depth, ancestor: row.ancestor, amount: *amount });
        }

        if plan.unused > 0 {
            credit(
                uow,
                Credit::company(plan.unused, EntryType::UnusedLevels, RefKey::unused_levels(paid.id))
                    .described(format!("{} of {} levels unfilled on {}", MAX_UPLINE_DEPTH - plan.chain_len, MAX_UPLINE_DEPTH, paid.id)),
                now,
            )?;
        }

        let (pool_contribution, pool_id) = self.fund_pool(uow, paid, now)?;

        let mut result = DistributionResult {
            purchase: paid.id,
            participant: paid.participant,
            class,
            amount: paid.amount,
            company_share: plan.company_share,
            user_pool: plan.user_pool,
            level_credits,
            unused_returned: plan.unused,
            self_income_reserve: plan.self_income_reserve,
            pool_contribution,
            pool: pool_id,
            placement,
            referral_code: None,
            sealed_team: None,
            promotions: Vec::new(),
            replayed: false,
        };

        if class == PurchaseClass::First {
            self.complete_first_purchase(uow, paid, &mut result)?;
        }

        let purchase = Purchase {
            id: paid.id,
            participant: paid.participant,
            amount: paid.amount,
            class,
            paid_at: now,
        };
        uow.insert_purchase(purchase, result.clone())?;

        info!(
            purchase = %paid.id,
            participant = %paid.participant,
            ?class,
            amount = paid.amount,
            company = result.company_share,
            levels = result.level_total(),
            unused = result.unused_returned,
            reserve = result.self_income_reserve,
            "purchase distributed"
        );
        Ok(result)
    }

    /// Move the pool share of a purchase from the company ledger into the
    /// open pool.
    fn fund_pool(
        &self,
        uow: &mut dyn UnitOfWork,
        paid: &PaidPurchase,
        now: DateTime<Utc>,
    ) -> EngineResult<(Amount, Option<PoolId>)> {
        let contribution = bps_share(paid.amount, self.config.pool_share_bps)?;
        if contribution == 0 {
            return Ok((0, None));
        }
        let pool = pool::accumulate(uow, contribution, now)?;
        credit(
            uow,
            Credit::company(-contribution, EntryType::PoolContribution, RefKey::pool_contribution(paid.id))
                .described(format!("{} contribution to {}", paid.id, pool.id)),
            now,
        )?;
        Ok((contribution, Some(pool.id)))
    }

    fn complete_first_purchase(
        &self,
        uow: &mut dyn UnitOfWork,
        paid: &PaidPurchase,
        result: &mut DistributionResult,
    ) -> EngineResult<()> {
        let now = paid.paid_at;
        let mut buyer = require_participant(uow, paid.participant)?;
        if buyer.first_purchase_at.is_none() {
            buyer.first_purchase_at = Some(now);
        }
        if buyer.referral_code.is_none() {
            buyer.referral_code = Some(issue_referral_code(uow, &self.config.referral_code_prefix)?);
        }
        result.referral_code = buyer.referral_code.clone();
        let placement_parent = buyer.placement_parent;
        uow.put_participant(buyer)?;

        self_income::reserve(uow, paid.participant, paid.id, result.self_income_reserve, now)?;

        let update = self.teams.on_first_purchase(uow, paid.participant, now)?;
        result.sealed_team = update.sealed;
        result.promotions = update.promotions;

        // A new qualified child may complete the parent's self-income eligibility.
        if let Some(parent) = placement_parent {
            self_income::release_pending_for(uow, parent, now)?;
        }
        Ok(())
    }
}

/// Generate a referral code not yet held by anyone
pub fn issue_referral_code(uow: &dyn UnitOfWork, prefix: &str) -> EngineResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(REFERRAL_CODE_LENGTH)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        let code = format!("{}{}", prefix, suffix);
        if uow.participant_by_referral_code(&code)?.is_none() {
            return Ok(code);
        }
    }
    Err(EngineError::Integrity(format!(
        "no unused referral code after {} attempts",
        REFERRAL_CODE_ATTEMPTS
    )))
}

/// Level credits a purchase produced for one ancestor
pub fn credits_to(result: &DistributionResult, ancestor: ParticipantId) -> Amount {
    result.level_credits.iter().filter(|c| c.ancestor == ancestor).map(|c| c.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use tierflow_types::{Participant, PurchaseId, TierLadder};

    fn distributor() -> Distributor {
        Distributor::new(EngineConfig::default(), TeamTracker::new(TierLadder::default()))
    }

    fn paid(id: u64, participant: u64, amount: Amount) -> PaidPurchase {
        PaidPurchase { id: PurchaseId(id), participant: ParticipantId(participant), amount, paid_at: Utc::now() }
    }

    fn registered(ids: &[(u64, Option<u64>)]) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .transact(|uow| {
                for (id, sponsor) in ids {
                    uow.put_participant(Participant::new(ParticipantId(*id), sponsor.map(ParticipantId), Utc::now()))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_first_purchase_places_and_issues_code() {
        let store = registered(&[(1, None), (2, Some(1))]);
        store.transact(|uow| distributor().distribute(uow, &paid(1, 1, 20_000))).unwrap();
        let result = store.transact(|uow| distributor().distribute(uow, &paid(2, 2, 20_000))).unwrap();

        assert_eq!(result.class, PurchaseClass::First);
        assert_eq!(result.placement.and_then(|p| p.parent), Some(ParticipantId(1)));
        assert_eq!(credits_to(&result, ParticipantId(1)), 3_500);
        assert!(result.referral_code.as_deref().is_some_and(|c| c.starts_with("TF") && c.len() == 10));
        assert!(result.is_conserved());
    }

    #[test]
    fn test_second_purchase_is_repurchase() {
        let store = registered(&[(1, None)]);
        store.transact(|uow| distributor().distribute(uow, &paid(1, 1, 20_000))).unwrap();
        let result = store.transact(|uow| distributor().distribute(uow, &paid(2, 1, 20_000))).unwrap();

        assert_eq!(result.class, PurchaseClass::Repurchase);
        assert_eq!(result.self_income_reserve, 0);
        assert!(result.placement.is_none());
    }

    #[test]
    fn test_replay_returns_stored_result() {
        let store = registered(&[(1, None)]);
        let first = store.transact(|uow| distributor().distribute(uow, &paid(1, 1, 20_000))).unwrap();
        let entries = store.transact(|uow| uow.entries_for(None)).unwrap().len();

        let replay = store.transact(|uow| distributor().distribute(uow, &paid(1, 1, 20_000))).unwrap();

        assert!(replay.replayed);
        assert_eq!(replay.company_share, first.company_share);
        assert_eq!(store.transact(|uow| uow.entries_for(None)).unwrap().len(), entries);
    }

    #[test]
    fn test_below_minimum_rejected_without_writes() {
        let store = registered(&[(1, None)]);
        let result = store.transact(|uow| distributor().distribute(uow, &paid(1, 1, 0)));
        assert!(matches!(result, Err(EngineError::Validation { .. })));
        assert!(store.transact(|uow| uow.tree_node(ParticipantId(1))).unwrap().is_none());
    }

    #[test]
    fn test_unknown_buyer_rejected() {
        let store = MemoryStore::new();
        let result = store.transact(|uow| distributor().distribute(uow, &paid(1, 99, 100)));
        assert_eq!(result, Err(EngineError::UnknownParticipant(ParticipantId(99))));
    }
}
