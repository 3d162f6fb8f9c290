//! # Domain Type Definitions
//!
//! Entities persisted by the rewards engine and the results its operations
//! return.

pub mod audit;
pub mod ids;
pub mod installment;
pub mod job;
pub mod ledger;
pub mod participant;
pub mod pool;
pub mod purchase;
pub mod team;
pub mod tree;
pub mod withdrawal;

// Re-export all types
pub use audit::*;
pub use ids::*;
pub use installment::*;
pub use job::*;
pub use ledger::*;
pub use participant::*;
pub use pool::*;
pub use purchase::*;
pub use team::*;
pub use tree::*;
pub use withdrawal::*;
