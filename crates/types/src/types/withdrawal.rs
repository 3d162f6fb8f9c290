//! # Withdrawal Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ids::{Amount, ParticipantId, WithdrawalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalState {
    Requested,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub participant: ParticipantId,
    pub amount: Amount,
    pub state: WithdrawalState,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Withdrawal {
    pub fn is_pending(&self) -> bool {
        self.state == WithdrawalState::Requested
    }
}
