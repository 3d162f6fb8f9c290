//! # Pool Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{POOL_TIER_SHARE_BPS, TIER_COUNT};
use crate::errors::EngineResult;
use crate::math::split_by_table;
use crate::types::ids::{Amount, ParticipantId, PoolId};
use crate::types::participant::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolStatus {
    Open,
    Closed,
}

/// Shared accumulation divided across tier cohorts on command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub status: PoolStatus,
    pub total: Amount,
    /// Tier 1 first; always sums to `total`
    pub tier_subtotals: [Amount; TIER_COUNT],
    pub opened_at: DateTime<Utc>,
    pub distributed_at: Option<DateTime<Utc>>,
}

impl Pool {
    pub fn open(id: PoolId, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: PoolStatus::Open,
            total: 0,
            tier_subtotals: [0; TIER_COUNT],
            opened_at,
            distributed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PoolStatus::Open
    }

    /// Recompute per-tier sub-totals from the running total
    pub fn resplit(&mut self) -> EngineResult<()> {
        self.tier_subtotals = split_by_table(self.total, &POOL_TIER_SHARE_BPS)?;
        Ok(())
    }

    pub fn subtotal(&self, tier: Tier) -> Amount {
        tier.index().map(|i| self.tier_subtotals[i]).unwrap_or(0)
    }
}

/// How one tier's sub-total was handed out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPayout {
    pub tier: Tier,
    pub subtotal: Amount,
    pub recipients: usize,
    pub share: Amount,
    /// Receives the floor remainder on top of `share`
    pub remainder_recipient: Option<ParticipantId>,
    pub remainder: Amount,
    /// Sub-total kept by the company because nobody holds this tier
    pub retained: Amount,
}

/// Result of distributing a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDistribution {
    pub pool: PoolId,
    pub total: Amount,
    pub payouts: Vec<TierPayout>,
    pub credits_written: usize,
    pub distributed_at: DateTime<Utc>,
}

impl PoolDistribution {
    pub fn retained_total(&self) -> Amount {
        self.payouts.iter().map(|p| p.retained).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resplit_tracks_total() {
        let mut pool = Pool::open(PoolId(1), Utc::now());
        pool.total = 60_000;
        pool.resplit().unwrap();
        assert_eq!(pool.tier_subtotals, [18_000, 12_000, 12_000, 9_000, 9_000]);
        assert_eq!(pool.subtotal(Tier::new(4).unwrap()), 9_000);
        assert_eq!(pool.subtotal(Tier::UNRANKED), 0);
    }
}
