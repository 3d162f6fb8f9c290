//! # Participant Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::TIER_COUNT;
use crate::types::ids::{Amount, ParticipantId};

/// Rank 1..=5, or 0 while the participant has no team yet.
/// Only ever raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(u8);

impl Tier {
    pub const UNRANKED: Tier = Tier(0);

    pub fn new(value: u8) -> Option<Self> {
        (value as usize <= TIER_COUNT).then_some(Tier(value))
    }

    /// Ranked tiers in ascending order
    pub fn ranked() -> impl Iterator<Item = Tier> {
        (1..=TIER_COUNT as u8).map(Tier)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_ranked(self) -> bool {
        self.0 > 0
    }

    /// Zero-based index into per-tier tables; `None` when unranked
    pub fn index(self) -> Option<usize> {
        self.is_ranked().then(|| self.0 as usize - 1)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ranked() {
            write!(f, "tier {}", self.0)
        } else {
            write!(f, "unranked")
        }
    }
}

/// Outcome of the out-of-scope KYC review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KycStatus {
    #[default]
    NotSubmitted,
    Pending,
    Verified,
    Rejected,
}

/// Calendar month used by the monthly eligibility rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(at: DateTime<Utc>) -> Self {
        use chrono::Datelike;
        Self { year: at.year(), month: at.month() }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        Self::of(at) == *self
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in '{}'", s))?;
        let month: u32 = month.parse().map_err(|_| format!("invalid month in '{}'", s))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{}'", s));
        }
        Ok(Self { year, month })
    }
}

/// A member of the rewards program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Who invited this participant. Seeds placement only.
    pub sponsor: Option<ParticipantId>,
    /// Where the participant sits in the tree. Set once, at first purchase.
    pub placement_parent: Option<ParticipantId>,
    pub placed: bool,
    pub tier: Tier,
    pub tier_overridden: bool,
    /// Denormalized sum of this participant's ledger entries
    pub wallet_balance: Amount,
    /// Teams sealed with this participant as leader
    pub direct_team_count: u32,
    /// Own teams plus every descendant's teams
    pub total_team_count: u32,
    /// Issued once, after the first purchase
    pub referral_code: Option<String>,
    pub first_purchase_at: Option<DateTime<Utc>>,
    pub kyc_status: KycStatus,
    pub monthly_eligible: bool,
    pub eligibility_period: Option<YearMonth>,
    pub registered_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(id: ParticipantId, sponsor: Option<ParticipantId>, registered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sponsor,
            placement_parent: None,
            placed: false,
            tier: Tier::UNRANKED,
            tier_overridden: false,
            wallet_balance: 0,
            direct_team_count: 0,
            total_team_count: 0,
            referral_code: None,
            first_purchase_at: None,
            kyc_status: KycStatus::NotSubmitted,
            monthly_eligible: false,
            eligibility_period: None,
            registered_at,
        }
    }

    pub fn has_first_purchase(&self) -> bool {
        self.first_purchase_at.is_some()
    }
}
