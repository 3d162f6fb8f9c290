//! # Reference Scenarios
//!
//! End-to-end checks of the reference scenarios: split of a first purchase with
//! no upline, a repurchase with a single ancestor, a team completing and
//! cascading, and pool distribution with an empty tier.

mod common;

use common::Harness;
use tierflow_engine::services::pool;
use tierflow_engine::{AdminCommand, AdminOutcome, Store};
use tierflow_types::{
    EntryType, InstallmentState, ParticipantId, PromotionSource, PurchaseClass, Tier, POOL_TIER_SHARE_BPS,
};

#[test]
fn scenario_a_first_purchase_with_empty_upline() {
    let mut h = Harness::new();
    let result = h.join(1, None, 20_000);

    assert_eq!(result.class, PurchaseClass::First);
    assert_eq!(result.company_share, 6_000);
    assert_eq!(result.user_pool, 14_000);
    assert!(result.level_credits.is_empty());
    assert_eq!(result.unused_returned, 3_500 + 2_800 + 2_100 + 1_400 + 1_400);
    assert_eq!(result.self_income_reserve, 2_800);
    assert!(result.is_conserved());

    let installments = h.engine.installments(ParticipantId(1)).unwrap();
    let amounts: Vec<i64> = installments.iter().map(|i| i.amount).collect();
    assert_eq!(amounts, vec![700, 700, 700, 700]);
    assert!(installments.iter().all(|i| i.state == InstallmentState::Scheduled));

    // Company ledger: share + unused, less the pool contribution.
    let company: i64 = h.engine.ledger(None).unwrap().iter().map(|e| e.amount).sum();
    assert_eq!(company, 6_000 + 11_200 - result.pool_contribution);
}

#[test]
fn scenario_b_repurchase_with_one_ancestor() {
    let mut h = Harness::new();
    h.join(1, None, 20_000);
    h.join(2, Some(1), 20_000);
    let before = h.wallet(1);

    let result = h.buy(2, 20_000);

    assert_eq!(result.class, PurchaseClass::Repurchase);
    assert_eq!(result.company_share, 6_000);
    assert_eq!(result.level_credits.len(), 1);
    assert_eq!(result.level_credits[0].ancestor, ParticipantId(1));
    assert_eq!(result.level_credits[0].amount, 4_200);
    assert_eq!(result.unused_returned, 9_800);
    assert_eq!(result.self_income_reserve, 0);
    assert!(result.is_conserved());
    assert_eq!(h.wallet(1) - before, 4_200);
}

#[test]
fn scenario_c_team_completion_cascades_and_promotes_once() {
    let mut h = Harness::new();
    h.join(1, None, 20_000); // root R
    h.join(10, Some(1), 20_000); // leader X under R

    // X's three direct children seal X's first team.
    h.join(11, Some(10), 20_000);
    h.join(12, Some(10), 20_000);
    let sealing = h.join(13, Some(10), 20_000);
    assert!(sealing.sealed_team.is_some());

    let x = h.engine.participant(ParticipantId(10)).unwrap();
    assert_eq!(x.direct_team_count, 1);
    assert_eq!(x.total_team_count, 1);
    assert_eq!(x.tier, Tier::new(1).unwrap());
    assert_eq!(h.engine.participant(ParticipantId(1)).unwrap().total_team_count, 1);

    // Two of X's children build teams of their own; X's total reaches 3.
    for (leader, first_child) in [(11, 20), (12, 30)] {
        for id in first_child..first_child + 3 {
            h.join(id, Some(leader), 20_000);
        }
    }

    let x = h.engine.participant(ParticipantId(10)).unwrap();
    assert_eq!(x.total_team_count, 3);
    assert_eq!(x.tier, Tier::new(2).unwrap());
    assert_eq!(h.engine.participant(ParticipantId(1)).unwrap().total_team_count, 3);

    // A repurchase in the subtree changes nothing.
    h.buy(20, 20_000);

    let to_tier2: Vec<_> = h
        .engine
        .promotions(ParticipantId(10))
        .unwrap()
        .into_iter()
        .filter(|p| p.to == Tier::new(2).unwrap())
        .collect();
    assert_eq!(to_tier2.len(), 1);
    assert_eq!(to_tier2[0].source, PromotionSource::TeamCount);
    assert_eq!(to_tier2[0].total_team_count, 3);
}

#[test]
fn scenario_d_pool_split_across_tiers() {
    let h = Harness::new();
    let tier3 = Tier::new(3).unwrap();
    for id in 1..=4 {
        h.register(id, None);
        h.engine
            .on_admin_command(
                AdminCommand::OverrideTier { participant: ParticipantId(id), tier: tier3, reason: None },
                h.clock,
            )
            .unwrap();
    }

    // 45_000 gives tier 3 a 9_000 sub-total.
    let opened = h.engine.store().transact(|uow| pool::accumulate(uow, 45_000, h.clock)).unwrap();
    assert_eq!(opened.subtotal(tier3), 9_000);

    let outcome = h
        .engine
        .on_admin_command(AdminCommand::DistributePool { pool: opened.id }, h.clock)
        .unwrap();
    let AdminOutcome::PoolDistributed(distribution) = outcome else {
        panic!("expected a pool distribution");
    };

    let tier3_payout = distribution.payouts.iter().find(|p| p.tier == tier3).unwrap();
    assert_eq!(tier3_payout.share, 2_250);
    assert_eq!(tier3_payout.remainder, 0);
    for id in 1..=4 {
        assert_eq!(h.wallet(id), 2_250);
    }
    assert_eq!(distribution.credits_written, 4);

    // Every other tier is empty and retained by the company.
    assert_eq!(distribution.retained_total(), 45_000 - 9_000);
    let retained = h
        .engine
        .ledger(None)
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::PoolRetained)
        .count();
    assert_eq!(retained, POOL_TIER_SHARE_BPS.len() - 1);
}

#[test]
fn scenario_d_empty_tier_retains_whole_subtotal() {
    let h = Harness::new();
    let opened = h.engine.store().transact(|uow| pool::accumulate(uow, 60_000, h.clock)).unwrap();
    let tier4 = Tier::new(4).unwrap();
    assert_eq!(opened.subtotal(tier4), 9_000);

    let distribution = h.engine.distribute_pool(opened.id, h.clock).unwrap();
    let payout = distribution.payouts.iter().find(|p| p.tier == tier4).unwrap();
    assert_eq!(payout.retained, 9_000);
    assert_eq!(payout.recipients, 0);
    assert_eq!(distribution.credits_written, 0);

    let pool = h.engine.pool(opened.id).unwrap();
    assert!(!pool.is_open());
}
