//! # Tierflow Types - Shared Domain Logic
//!
//! Core types and pure arithmetic shared by the rewards engine and the
//! keeper service. It provides:
//!
//! - Identifiers and entity definitions (participants, tree nodes, ledger
//!   entries, installments, teams, pools, withdrawals)
//! - Percentage tables and structural limits
//! - The tier threshold ladder
//! - Overflow-checked integer split arithmetic
//! - The engine error taxonomy

pub mod constants;
pub mod errors;
pub mod ladder;
pub mod math;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use errors::{EngineError, EngineResult};
pub use ladder::{LadderPreset, TierLadder};
pub use types::*;
