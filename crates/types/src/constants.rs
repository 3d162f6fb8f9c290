//! # Program Constants
//!
//! Percentage tables and structural limits of the rewards program:
//! - Company / user-pool split
//! - Per-level upline percentages for each purchase class
//! - Self-income reservation and installment cadence
//! - Tree width and ancestor-index depth
//! - Pool tier share table

// ============================================================================
// Percentage Constants
// ============================================================================

/// Basis points denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Company share of every incentive-bearing amount (30%)
pub const COMPANY_SHARE_BPS: i64 = 3_000;

/// Upline level percentages of the user pool for a first purchase.
/// Sums to 80%; the remaining 20% is the self-income reserve.
pub const FIRST_PURCHASE_LEVEL_BPS: [i64; MAX_UPLINE_DEPTH] = [2_500, 2_000, 1_500, 1_000, 1_000];

/// Upline level percentages of the user pool for a repurchase (sums to 100%)
pub const REPURCHASE_LEVEL_BPS: [i64; MAX_UPLINE_DEPTH] = [3_000, 2_000, 2_000, 1_500, 1_500];

/// Self-income reserve taken from the user pool on a first purchase (20%)
pub const SELF_INCOME_RESERVE_BPS: i64 = 2_000;

/// Share of each tier in a pool, tier 1 first (30/20/20/15/15)
pub const POOL_TIER_SHARE_BPS: [i64; TIER_COUNT] = [3_000, 2_000, 2_000, 1_500, 1_500];

/// Default share of each purchase that funds the open pool (5%)
pub const DEFAULT_POOL_SHARE_BPS: i64 = 500;

// ============================================================================
// Structural Limits
// ============================================================================

/// Maximum children under one placement parent
pub const MAX_CHILDREN: usize = 3;

/// Depth of the ancestor index and of commission distribution
pub const MAX_UPLINE_DEPTH: usize = 5;

/// Members in a sealed team
pub const TEAM_SIZE: usize = 3;

/// Number of ranked tiers
pub const TIER_COUNT: usize = 5;

/// Placement-direct children with a first purchase required for self-income
pub const SELF_INCOME_MIN_DIRECT_CHILDREN: usize = 3;

// ============================================================================
// Installment Constants
// ============================================================================

/// Installments created per self-income reserve
pub const INSTALLMENT_COUNT: u8 = 4;

/// Days between consecutive installments (first one due after one interval)
pub const INSTALLMENT_INTERVAL_DAYS: i64 = 7;

/// Default retries before an installment is marked permanently failed
pub const DEFAULT_INSTALLMENT_MAX_RETRIES: u32 = 3;

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Default absolute wallet drift (minor units) corrected automatically
pub const DEFAULT_AUTO_CORRECT_CAP: i64 = 100;

/// Health score weights (sum to 100)
pub const HEALTH_WEIGHT_WALLETS: u32 = 40;
pub const HEALTH_WEIGHT_TREE: u32 = 30;
pub const HEALTH_WEIGHT_SLOTS: u32 = 15;
pub const HEALTH_WEIGHT_FLAGS: u32 = 15;

// ============================================================================
// Validation Thresholds
// ============================================================================

/// Default minimum incentive amount of a qualifying purchase
pub const DEFAULT_MIN_QUALIFYING_AMOUNT: i64 = 1;

/// Default minimum withdrawal (minor units)
pub const DEFAULT_MIN_WITHDRAWAL: i64 = 1_000;

/// Default minimum monthly purchase volume for pool eligibility
pub const DEFAULT_MIN_MONTHLY_PURCHASE: i64 = 5_000;

/// Length of the random part of a referral code
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// Attempts at drawing an unused referral code before giving up
pub const REFERRAL_CODE_ATTEMPTS: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tables_sum_to_expected_shares() {
        let first: i64 = FIRST_PURCHASE_LEVEL_BPS.iter().sum();
        let repurchase: i64 = REPURCHASE_LEVEL_BPS.iter().sum();

        assert_eq!(first + SELF_INCOME_RESERVE_BPS, BPS_DENOMINATOR);
        assert_eq!(repurchase, BPS_DENOMINATOR);
    }

    #[test]
    fn pool_and_health_tables_are_complete() {
        assert_eq!(POOL_TIER_SHARE_BPS.iter().sum::<i64>(), BPS_DENOMINATOR);
        assert_eq!(
            HEALTH_WEIGHT_WALLETS + HEALTH_WEIGHT_TREE + HEALTH_WEIGHT_SLOTS + HEALTH_WEIGHT_FLAGS,
            100
        );
    }
}
