//! Engine components, leaves first.

pub mod auditor;
pub mod commission;
pub mod eligibility;
pub mod ledger;
pub mod placement;
pub mod pool;
pub mod self_income;
pub mod teams;
pub mod withdrawals;

pub use auditor::Auditor;
pub use commission::Distributor;
pub use ledger::{credit, Credit};
pub use self_income::Settlement;
pub use teams::{TeamTracker, TeamUpdate};
