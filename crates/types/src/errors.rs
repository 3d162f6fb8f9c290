//! # Engine Error Types
//!
//! Error taxonomy shared by every component of the rewards engine. Business
//! outcomes that are not failures (eligibility not met, a short upline chain,
//! reconciliation findings) are modelled as states and never appear here.

use thiserror::Error;

use crate::types::{ParticipantId, PoolId, PurchaseId, WithdrawalId};

/// Errors raised by engine operations. Any error returned from inside a unit
/// of work rolls the whole unit back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ========================================================================
    // Input Validation
    // ========================================================================

    #[error("Invalid parameter '{parameter}': got '{value}', expected {expected}")]
    Validation {
        parameter: String,
        value: String,
        expected: String,
    },

    #[error("Unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("Participant {0} is already registered")]
    AlreadyRegistered(ParticipantId),

    #[error("Unknown purchase {0}")]
    UnknownPurchase(PurchaseId),

    // ========================================================================
    // Placement
    // ========================================================================

    #[error("Participant {0} is already placed in the tree")]
    AlreadyPlaced(ParticipantId),

    #[error("Slot {slot} under {parent} was claimed concurrently")]
    PlacementConflict { parent: ParticipantId, slot: u8 },

    #[error("No open slot could be claimed for {0}")]
    PlacementExhausted(ParticipantId),

    // ========================================================================
    // Ledger and Wallet
    // ========================================================================

    #[error("Ledger reference '{0}' already exists")]
    DuplicateRefKey(String),

    #[error("Arithmetic overflow in '{0}'")]
    Arithmetic(&'static str),

    #[error("Insufficient balance for {participant}: need {required}, have {available}")]
    InsufficientBalance {
        participant: ParticipantId,
        required: i64,
        available: i64,
    },

    #[error("Participant {0} has no verified KYC record")]
    KycRequired(ParticipantId),

    // ========================================================================
    // State Machines
    // ========================================================================

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Unknown installment {purchase}#{sequence}")]
    UnknownInstallment { purchase: PurchaseId, sequence: u8 },

    #[error("Unknown pool {0}")]
    UnknownPool(PoolId),

    #[error("Pool {0} has already been distributed")]
    PoolAlreadyDistributed(PoolId),

    #[error("Unknown withdrawal {0}")]
    UnknownWithdrawal(WithdrawalId),

    // ========================================================================
    // Infrastructure
    // ========================================================================

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type using engine errors
pub type EngineResult<T> = Result<T, EngineError>;

// Helper functions for creating specific errors
impl EngineError {
    /// Create a validation error for a rejected input
    pub fn invalid(parameter: &str, value: impl ToString, expected: &str) -> Self {
        Self::Validation {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create an invalid state transition error
    pub fn transition(entity: impl ToString, from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            entity: entity.to_string(),
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Whether a batch item failing with this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Arithmetic(_) | Self::PlacementConflict { .. } | Self::Integrity(_)
        )
    }
}
