//! # Purchase and Commission Split Types
//!
//! The split of a purchase is a pure function of its amount, its class and
//! the length of the buyer's upline chain. Floor division is used throughout
//! and every remainder returns to the company as unused levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    COMPANY_SHARE_BPS, FIRST_PURCHASE_LEVEL_BPS, MAX_UPLINE_DEPTH, REPURCHASE_LEVEL_BPS,
    SELF_INCOME_RESERVE_BPS,
};
use crate::errors::{EngineError, EngineResult};
use crate::math::{bps_share, safe_add, safe_sub};
use crate::types::ids::{Amount, ParticipantId, PoolId, PurchaseId, TeamId};
use crate::types::team::PromotionRecord;
use crate::types::tree::Placement;

/// Purchase classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseClass {
    /// The participant's first qualifying purchase
    First,
    Repurchase,
}

impl PurchaseClass {
    pub fn classify(prior_qualifying_purchases: usize) -> Self {
        if prior_qualifying_purchases == 0 {
            PurchaseClass::First
        } else {
            PurchaseClass::Repurchase
        }
    }

    /// Per-depth share of the user pool, depth 1 first
    pub fn level_bps(self) -> &'static [i64; MAX_UPLINE_DEPTH] {
        match self {
            PurchaseClass::First => &FIRST_PURCHASE_LEVEL_BPS,
            PurchaseClass::Repurchase => &REPURCHASE_LEVEL_BPS,
        }
    }

    /// Share of the user pool reserved for self-income
    pub fn self_income_bps(self) -> i64 {
        match self {
            PurchaseClass::First => SELF_INCOME_RESERVE_BPS,
            PurchaseClass::Repurchase => 0,
        }
    }
}

/// Input from the checkout flow; payment has already been verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidPurchase {
    pub id: PurchaseId,
    pub participant: ParticipantId,
    /// Incentive-bearing price in minor units
    pub amount: Amount,
    pub paid_at: DateTime<Utc>,
}

/// Immutable stored purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub participant: ParticipantId,
    pub amount: Amount,
    pub class: PurchaseClass,
    pub paid_at: DateTime<Utc>,
}

/// Planned division of one purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub amount: Amount,
    pub class: PurchaseClass,
    pub company_share: Amount,
    pub user_pool: Amount,
    /// Amount owed at each depth, depth 1 first, regardless of chain length
    pub level_amounts: [Amount; MAX_UPLINE_DEPTH],
    /// How many of `level_amounts` have a recipient
    pub chain_len: usize,
    pub self_income_reserve: Amount,
    /// Levels without a recipient plus floor remainders
    pub unused: Amount,
}

impl SplitPlan {
    pub fn compute(amount: Amount, class: PurchaseClass, chain_len: usize) -> EngineResult<Self> {
        if amount <= 0 {
            return Err(EngineError::invalid("amount", amount, "greater than 0"));
        }
        let chain_len = chain_len.min(MAX_UPLINE_DEPTH);

        let company_share = bps_share(amount, COMPANY_SHARE_BPS)?;
        let user_pool = safe_sub(amount, company_share)?;

        let mut level_amounts = [0; MAX_UPLINE_DEPTH];
        for (slot, bps) in level_amounts.iter_mut().zip(class.level_bps().iter()) {
            *slot = bps_share(user_pool, *bps)?;
        }
        let self_income_reserve = bps_share(user_pool, class.self_income_bps())?;

        let mut credited = 0;
        for level in &level_amounts[..chain_len] {
            credited = safe_add(credited, *level)?;
        }
        let unused = safe_sub(safe_sub(user_pool, credited)?, self_income_reserve)?;

        Ok(Self {
            amount,
            class,
            company_share,
            user_pool,
            level_amounts,
            chain_len,
            self_income_reserve,
            unused,
        })
    }

    /// Amounts paid to ancestors, depth 1 first
    pub fn credited_levels(&self) -> &[Amount] {
        &self.level_amounts[..self.chain_len]
    }

    /// company + levels + unused + reserve; always equals `amount`
    pub fn accounted_total(&self) -> EngineResult<Amount> {
        let mut total = safe_add(self.company_share, self.unused)?;
        total = safe_add(total, self.self_income_reserve)?;
        for level in self.credited_levels() {
            total = safe_add(total, *level)?;
        }
        Ok(total)
    }
}

/// One upline credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCredit {
    pub depth: u8,
    pub ancestor: ParticipantId,
    pub amount: Amount,
}

/// Everything a purchase produced; stored so that a replay returns it as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub purchase: PurchaseId,
    pub participant: ParticipantId,
    pub class: PurchaseClass,
    pub amount: Amount,
    pub company_share: Amount,
    pub user_pool: Amount,
    pub level_credits: Vec<LevelCredit>,
    pub unused_returned: Amount,
    pub self_income_reserve: Amount,
    pub pool_contribution: Amount,
    pub pool: Option<PoolId>,
    pub placement: Option<Placement>,
    pub referral_code: Option<String>,
    pub sealed_team: Option<TeamId>,
    pub promotions: Vec<PromotionRecord>,
    /// True when this result was returned for an already processed purchase
    pub replayed: bool,
}

impl DistributionResult {
    pub fn level_total(&self) -> Amount {
        self.level_credits.iter().map(|c| c.amount).sum()
    }

    /// Conservation check: company + levels + unused + reserve == amount
    pub fn is_conserved(&self) -> bool {
        self.company_share + self.level_total() + self.unused_returned + self.self_income_reserve == self.amount
    }
}
