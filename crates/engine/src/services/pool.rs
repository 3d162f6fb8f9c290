//! Pool accumulation and distribution coordinator.
//!
//! At most one pool is open at a time; it is looked up by status rather
//! than held in memory. Distribution splits each tier's sub-total equally
//! across the participants currently holding that tier. The floor remainder
//! goes to the member with the lowest id, and a tier nobody holds keeps its
//! whole sub-total for the company.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tierflow_types::math::{safe_add, split_evenly};
use tierflow_types::{
    Amount, EngineError, EngineResult, EntryType, ParticipantId, Pool, PoolDistribution, PoolId, PoolStatus,
    RefKey, Sequence, Tier, TierPayout,
};

use crate::services::ledger::{credit, Credit};
use crate::store::UnitOfWork;

/// Add `amount` to the open pool, opening one if needed, and re-derive the
/// per-tier sub-totals.
pub fn accumulate(uow: &mut dyn UnitOfWork, amount: Amount, now: DateTime<Utc>) -> EngineResult<Pool> {
    if amount < 0 {
        return Err(EngineError::invalid("amount", amount, "non-negative"));
    }

    let mut pool = match uow.open_pool()? {
        Some(pool) => pool,
        None => {
            let id = PoolId(uow.next_id(Sequence::Pool)?);
            info!(pool = %id, "opened new pool");
            Pool::open(id, now)
        }
    };

    pool.total = safe_add(pool.total, amount)?;
    pool.resplit()?;
    debug!(pool = %pool.id, amount, total = pool.total, "pool accumulated");

    uow.put_pool(pool.clone())?;
    Ok(pool)
}

/// Close `pool_id` and pay out every tier's sub-total
pub fn distribute(uow: &mut dyn UnitOfWork, pool_id: PoolId, now: DateTime<Utc>) -> EngineResult<PoolDistribution> {
    let mut pool = uow.pool(pool_id)?.ok_or(EngineError::UnknownPool(pool_id))?;
    if !pool.is_open() {
        return Err(EngineError::PoolAlreadyDistributed(pool_id));
    }

    let participants = uow.participants()?;
    let mut payouts = Vec::with_capacity(pool.tier_subtotals.len());
    let mut credits_written = 0;

    for tier in Tier::ranked() {
        let subtotal = pool.subtotal(tier);
        // participants() is ordered by id, so the first member is the lowest.
        let members: Vec<ParticipantId> = participants.iter().filter(|p| p.tier == tier).map(|p| p.id).collect();
        let mut payout = TierPayout {
            tier,
            subtotal,
            recipients: members.len(),
            share: 0,
            remainder_recipient: None,
            remainder: 0,
            retained: 0,
        };

        if subtotal == 0 {
            payouts.push(payout);
            continue;
        }

        if members.is_empty() {
            credit(
                uow,
                Credit::company(subtotal, EntryType::PoolRetained, RefKey::pool_retained(pool_id, tier))
                    .described(format!("{} has no participants", tier)),
                now,
            )?;
            warn!(pool = %pool_id, %tier, subtotal, "no participants at tier, company retains sub-total");
            payout.retained = subtotal;
            payouts.push(payout);
            continue;
        }

        let (share, remainder) = split_evenly(subtotal, members.len())?;
        payout.share = share;
        payout.remainder = remainder;
        payout.remainder_recipient = members.first().copied();

        for (index, member) in members.iter().enumerate() {
            let amount = if index == 0 { safe_add(share, remainder)? } else { share };
            if amount == 0 {
                continue;
            }
            credit(
                uow,
                Credit::to(*member, amount, EntryType::PoolShare, RefKey::pool_share(pool_id, tier, *member))
                    .described(format!("{} share of {}", tier, pool_id)),
                now,
            )?;
            credits_written += 1;
        }
        debug!(pool = %pool_id, %tier, subtotal, recipients = members.len(), share, remainder, "tier paid out");
        payouts.push(payout);
    }

    pool.status = PoolStatus::Closed;
    pool.distributed_at = Some(now);
    uow.put_pool(pool.clone())?;

    let distribution = PoolDistribution { pool: pool_id, total: pool.total, payouts, credits_written, distributed_at: now };
    info!(
        pool = %pool_id,
        total = pool.total,
        credits = credits_written,
        retained = distribution.retained_total(),
        "pool distributed"
    );
    Ok(distribution)
}
