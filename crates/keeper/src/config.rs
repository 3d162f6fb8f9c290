use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tierflow_engine::EngineConfig;

use crate::error::{KeeperError, KeeperResult};

/// Keeper configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
    /// JSON snapshot the store is loaded from and persisted to
    pub snapshot_path: PathBuf,

    /// Log filter used when neither --log-level nor RUST_LOG is given
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Batch job intervals
    pub schedule: ScheduleConfig,

    /// Retry configuration for snapshot persistence
    pub retry: RetryConfig,

    /// Rewards engine parameters
    #[serde(default)]
    pub engine: EngineConfig,
}

/// How often `run` ticks each batch job
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Installment settlement interval in seconds
    pub settlement_interval_secs: u64,

    /// Monthly eligibility rollup interval in seconds
    pub rollup_interval_secs: u64,

    /// Reconciliation interval in seconds
    pub reconciliation_interval_secs: u64,

    /// Log the latest health score every N ticks
    pub health_log_every: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of retries for failed operations
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> KeeperResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| KeeperError::Io(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: KeeperConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> KeeperResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| KeeperError::Io(format!("Failed to write config file {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Log filter directive in effect: an explicit CLI level first, then
    /// `RUST_LOG`, then the configured level
    pub fn log_directive(&self, cli_level: Option<&str>, env_filter: Option<&str>) -> String {
        [cli_level, env_filter]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|directive| !directive.is_empty())
            .unwrap_or(self.log_level.as_str())
            .to_string()
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(KeeperError::InvalidConfig("snapshot_path must not be empty".to_string()));
        }

        if self.log_level.trim().is_empty() {
            return Err(KeeperError::InvalidConfig("log_level must not be empty".to_string()));
        }

        self.schedule.validate()?;
        self.retry.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl ScheduleConfig {
    fn validate(&self) -> KeeperResult<()> {
        let intervals = [
            ("settlement_interval_secs", self.settlement_interval_secs),
            ("rollup_interval_secs", self.rollup_interval_secs),
            ("reconciliation_interval_secs", self.reconciliation_interval_secs),
            ("health_log_every", self.health_log_every),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(KeeperError::InvalidConfig(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> KeeperResult<()> {
        if self.base_delay_ms == 0 {
            return Err(KeeperError::InvalidConfig("base_delay_ms must be greater than 0".to_string()));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(KeeperError::InvalidConfig(format!(
                "max_delay_ms ({}) must be at least base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }

        if self.backoff_multiplier <= 1.0 {
            return Err(KeeperError::InvalidConfig(format!(
                "backoff_multiplier ({}) must be greater than 1.0",
                self.backoff_multiplier
            )));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("tierflow-snapshot.json"),
            log_level: default_log_level(),
            json_logs: false,
            schedule: ScheduleConfig::default(),
            retry: RetryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            settlement_interval_secs: 3_600,     // hourly
            rollup_interval_secs: 86_400,        // daily
            reconciliation_interval_secs: 21_600, // every 6 hours
            health_log_every: 24,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: impl AsRef<Path>) -> KeeperResult<()> {
    let example_config = KeeperConfig {
        snapshot_path: PathBuf::from("data/tierflow-snapshot.json"),
        log_level: "info,tierflow_engine=debug".to_string(),
        json_logs: false,
        schedule: ScheduleConfig {
            settlement_interval_secs: 900,
            rollup_interval_secs: 43_200,
            reconciliation_interval_secs: 3_600,
            health_log_every: 12,
        },
        retry: RetryConfig::default(),
        engine: EngineConfig::default(),
    };

    example_config.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = KeeperConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = KeeperConfig::default();
        config.schedule.settlement_interval_secs = 0;
        assert!(matches!(config.validate(), Err(KeeperError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_engine_section_rejected() {
        let mut config = KeeperConfig::default();
        config.engine.pool_share_bps = -1;
        assert!(matches!(config.validate(), Err(KeeperError::Engine(_))));
    }

    #[test]
    fn test_log_directive_precedence() {
        let config = KeeperConfig { log_level: "warn".to_string(), ..KeeperConfig::default() };

        assert_eq!(config.log_directive(Some("debug"), Some("tierflow_engine=trace")), "debug");
        assert_eq!(config.log_directive(None, Some("tierflow_engine=trace")), "tierflow_engine=trace");
        assert_eq!(config.log_directive(None, None), "warn");
        assert_eq!(config.log_directive(Some("  "), Some("")), "warn");
    }

    #[test]
    fn test_retry_delays() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), 500);
        assert_eq!(retry.delay_for_attempt(1), 1_000);
        assert_eq!(retry.delay_for_attempt(2), 2_000);
        assert_eq!(retry.delay_for_attempt(10), 10_000);
    }

    #[test]
    fn test_example_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keeper.toml");
        create_example_config(&path).unwrap();

        let loaded = KeeperConfig::load(&path).unwrap();
        assert_eq!(loaded.schedule.settlement_interval_secs, 900);
        assert_eq!(loaded.engine, EngineConfig::default());
    }

    #[test]
    fn test_engine_section_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keeper.toml");
        fs::write(
            &path,
            r#"
snapshot_path = "state.json"

[schedule]
settlement_interval_secs = 60
rollup_interval_secs = 60
reconciliation_interval_secs = 60
health_log_every = 1

[retry]
max_retries = 1
base_delay_ms = 10
max_delay_ms = 20
backoff_multiplier = 2.0
"#,
        )
        .unwrap();

        let loaded = KeeperConfig::load(&path).unwrap();
        assert_eq!(loaded.log_level, "info");
        assert!(!loaded.json_logs);
        assert_eq!(loaded.engine.pool_share_bps, EngineConfig::default().pool_share_bps);
    }
}
