//! # Self-Income Installment Types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{INSTALLMENT_COUNT, INSTALLMENT_INTERVAL_DAYS};
use crate::errors::{EngineError, EngineResult};
use crate::math::{safe_mul, safe_sub, split_evenly};
use crate::types::ids::{Amount, ParticipantId, PurchaseId};

/// Installment lifecycle. Transitions only move forward; an administrator
/// override is the single exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallmentState {
    Scheduled,
    PendingEligibility,
    Paid,
    Skipped,
    PermanentlyFailed,
}

impl InstallmentState {
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            InstallmentState::Paid | InstallmentState::Skipped | InstallmentState::PermanentlyFailed
        )
    }

    pub fn can_transition_to(self, next: InstallmentState) -> bool {
        use InstallmentState::*;
        match (self, next) {
            (Scheduled, PendingEligibility | Paid | Skipped | PermanentlyFailed) => true,
            (PendingEligibility, Paid | Skipped | PermanentlyFailed) => true,
            _ => false,
        }
    }
}

/// Identifies an installment: originating purchase and sequence 1..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstallmentKey {
    pub purchase: PurchaseId,
    pub sequence: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub key: InstallmentKey,
    pub participant: ParticipantId,
    pub amount: Amount,
    pub due_at: DateTime<Utc>,
    pub state: InstallmentState,
    pub retry_count: u32,
    pub note: Option<String>,
    pub last_error: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Installment {
    /// Move to `next`, rejecting backward transitions
    pub fn advance(&mut self, next: InstallmentState, note: Option<String>) -> EngineResult<()> {
        if self.state == next && !next.is_settled() {
            self.note = note.or(self.note.take());
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(EngineError::transition(
                format!("installment {}#{}", self.key.purchase, self.key.sequence),
                self.state,
                next,
            ));
        }
        self.state = next;
        if note.is_some() {
            self.note = note;
        }
        Ok(())
    }
}

/// Split a reserve into installment amounts: the first ones are equal floor
/// shares and the last absorbs the remainder, so the sum equals the reserve.
pub fn installment_amounts(reserve: Amount) -> EngineResult<[Amount; INSTALLMENT_COUNT as usize]> {
    if reserve < 0 {
        return Err(EngineError::invalid("reserve", reserve, "non-negative"));
    }
    let (share, _) = split_evenly(reserve, INSTALLMENT_COUNT as usize)?;
    let mut amounts = [share; INSTALLMENT_COUNT as usize];
    let leading = safe_mul(share, INSTALLMENT_COUNT as i64 - 1)?;
    amounts[INSTALLMENT_COUNT as usize - 1] = safe_sub(reserve, leading)?;
    Ok(amounts)
}

/// Due time of installment `sequence` (1-based) for a reserve made at `from`
pub fn installment_due_at(from: DateTime<Utc>, sequence: u8) -> DateTime<Utc> {
    from + Duration::days(INSTALLMENT_INTERVAL_DAYS * sequence as i64)
}
