//! # Team and Promotion Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TEAM_SIZE;
use crate::types::ids::{ParticipantId, TeamId};
use crate::types::participant::Tier;

/// A leader's group of placement-direct children who completed a first
/// purchase. Fills one member at a time; immutable once sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub leader: ParticipantId,
    /// In joining order
    pub members: Vec<ParticipantId>,
    pub opened_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl Team {
    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= TEAM_SIZE
    }
}

/// What raised a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionSource {
    TeamCount,
    Administrator,
}

/// Written exactly once per promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub participant: ParticipantId,
    pub from: Tier,
    pub to: Tier,
    pub total_team_count: u32,
    pub source: PromotionSource,
    pub reason: Option<String>,
    pub promoted_at: DateTime<Utc>,
}
