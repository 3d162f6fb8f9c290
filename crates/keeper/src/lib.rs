//! Tierflow keeper: scheduled batch jobs and administrator commands over a
//! snapshot-backed rewards engine.

pub mod config;
pub mod error;
pub mod keeper;

pub use config::{create_example_config, KeeperConfig, RetryConfig, ScheduleConfig};
pub use error::{KeeperError, KeeperResult};
pub use keeper::{Job, Keeper};
