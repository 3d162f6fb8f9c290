//! Tier threshold ladder.
//!
//! Maps a cumulative team count to a tier. Two threshold tables are in use
//! across deployments, so the table is configuration rather than a constant.

use serde::{Deserialize, Serialize};

use crate::constants::TIER_COUNT;
use crate::errors::{EngineError, EngineResult};
use crate::types::Tier;

/// Named threshold tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LadderPreset {
    /// 1 / 3 / 9 / 27 / 81
    PowersOfThree,
    /// 1 / 9 / 27 / 81 / 243
    Extended,
}

/// Minimum total team count for each tier, tier 1 first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLadder {
    thresholds: [u32; TIER_COUNT],
}

impl TierLadder {
    pub const POWERS_OF_THREE: TierLadder = TierLadder { thresholds: [1, 3, 9, 27, 81] };
    pub const EXTENDED: TierLadder = TierLadder { thresholds: [1, 9, 27, 81, 243] };

    /// Build a ladder from explicit thresholds. They must be positive and
    /// strictly increasing so that tier is monotonic in team count.
    pub fn new(thresholds: [u32; TIER_COUNT]) -> EngineResult<Self> {
        if thresholds[0] == 0 {
            return Err(EngineError::invalid("tier_thresholds[0]", 0, "at least 1"));
        }
        if thresholds.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::invalid(
                "tier_thresholds",
                format!("{:?}", thresholds),
                "strictly increasing values",
            ));
        }
        Ok(Self { thresholds })
    }

    pub fn from_preset(preset: LadderPreset) -> Self {
        match preset {
            LadderPreset::PowersOfThree => Self::POWERS_OF_THREE,
            LadderPreset::Extended => Self::EXTENDED,
        }
    }

    pub fn thresholds(&self) -> &[u32; TIER_COUNT] {
        &self.thresholds
    }

    /// Highest tier whose threshold is met, or unranked below tier 1
    pub fn tier_for(&self, total_team_count: u32) -> Tier {
        let reached = self.thresholds.iter().take_while(|t| total_team_count >= **t).count();
        Tier::new(reached as u8).unwrap_or(Tier::UNRANKED)
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        Self::POWERS_OF_THREE
    }
}
