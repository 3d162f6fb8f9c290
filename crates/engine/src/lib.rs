//! # Tierflow Engine
//!
//! Commission, placement and incentive-distribution engine for a
//! multi-level purchase-rewards program.
//!
//! For every verified purchase the engine places first-time buyers into a
//! three-wide placement tree, splits the incentive amount between the
//! company and up to five upline levels, schedules self-income
//! installments, tracks team formation and tier promotion, and funds a
//! shared pool that administrators distribute across tiers. An auditor
//! checks the resulting ledger and tree on a schedule.
//!
//! All state goes through the [`store::Store`] port; [`store::MemoryStore`]
//! is the bundled implementation.

pub mod admin;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod services;
pub mod store;

pub use admin::{AdminCommand, AdminOutcome};
pub use config::EngineConfig;
pub use engine::RewardsEngine;
pub use store::{MemoryStore, Snapshot, Store, UnitOfWork};
