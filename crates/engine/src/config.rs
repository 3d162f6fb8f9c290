use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tierflow_types::{
    EngineError, EngineResult, LadderPreset, ParticipantId, TierLadder, COMPANY_SHARE_BPS, DEFAULT_AUTO_CORRECT_CAP,
    DEFAULT_INSTALLMENT_MAX_RETRIES, DEFAULT_MIN_MONTHLY_PURCHASE, DEFAULT_MIN_QUALIFYING_AMOUNT,
    DEFAULT_MIN_WITHDRAWAL, DEFAULT_POOL_SHARE_BPS, TIER_COUNT,
};

/// Engine configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed placement root used when a buyer has no placed sponsor
    pub root_participant: Option<ParticipantId>,

    /// Named tier threshold table
    pub ladder: LadderPreset,

    /// Explicit thresholds for tiers 1..=5; overrides `ladder` when set
    pub tier_thresholds: Option<[u32; TIER_COUNT]>,

    /// Share of every purchase moved from the company share into the open
    /// pool (basis points, at most the company share)
    pub pool_share_bps: i64,

    /// Smallest incentive amount that counts as a qualifying purchase
    pub min_qualifying_amount: i64,

    /// Settlement attempts before an installment is marked permanently failed
    pub installment_max_retries: u32,

    /// Largest wallet drift the auditor corrects on its own
    pub auto_correct_cap: i64,

    /// Smallest withdrawal request accepted
    pub min_withdrawal: i64,

    /// Monthly purchase total that sets the monthly-eligible flag
    pub min_monthly_purchase: i64,

    /// Prefix of issued referral codes
    pub referral_code_prefix: String,
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            EngineError::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            EngineError::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(thresholds) = self.tier_thresholds {
            TierLadder::new(thresholds)?;
        }

        if !(0..=COMPANY_SHARE_BPS).contains(&self.pool_share_bps) {
            return Err(EngineError::invalid(
                "pool_share_bps",
                self.pool_share_bps,
                &format!("between 0 and the company share ({})", COMPANY_SHARE_BPS),
            ));
        }

        if self.min_qualifying_amount <= 0 {
            return Err(EngineError::invalid("min_qualifying_amount", self.min_qualifying_amount, "greater than 0"));
        }

        if self.installment_max_retries == 0 {
            return Err(EngineError::invalid("installment_max_retries", 0, "greater than 0"));
        }

        if self.auto_correct_cap < 0 {
            return Err(EngineError::invalid("auto_correct_cap", self.auto_correct_cap, "non-negative"));
        }

        if self.min_withdrawal <= 0 {
            return Err(EngineError::invalid("min_withdrawal", self.min_withdrawal, "greater than 0"));
        }

        if self.min_monthly_purchase < 0 {
            return Err(EngineError::invalid("min_monthly_purchase", self.min_monthly_purchase, "non-negative"));
        }

        if self.referral_code_prefix.len() > 8 || !self.referral_code_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EngineError::invalid(
                "referral_code_prefix",
                &self.referral_code_prefix,
                "at most 8 ASCII alphanumeric characters",
            ));
        }

        Ok(())
    }

    /// Threshold ladder in effect
    pub fn tier_ladder(&self) -> EngineResult<TierLadder> {
        match self.tier_thresholds {
            Some(thresholds) => TierLadder::new(thresholds),
            None => Ok(TierLadder::from_preset(self.ladder)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_participant: None,
            ladder: LadderPreset::PowersOfThree,
            tier_thresholds: None,
            pool_share_bps: DEFAULT_POOL_SHARE_BPS, // 5%
            min_qualifying_amount: DEFAULT_MIN_QUALIFYING_AMOUNT,
            installment_max_retries: DEFAULT_INSTALLMENT_MAX_RETRIES,
            auto_correct_cap: DEFAULT_AUTO_CORRECT_CAP,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            min_monthly_purchase: DEFAULT_MIN_MONTHLY_PURCHASE,
            referral_code_prefix: "TF".to_string(),
        }
    }
}
