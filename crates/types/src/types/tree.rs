//! # Placement Tree Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CHILDREN;
use crate::types::ids::ParticipantId;

/// Slot number assigned to the tree root, which has no parent
pub const ROOT_SLOT: u8 = 0;

/// One node per placed participant. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub participant: ParticipantId,
    pub parent: Option<ParticipantId>,
    /// 1..=3 under a parent, `ROOT_SLOT` at the root
    pub slot: u8,
    pub placed_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn slot_in_bounds(&self) -> bool {
        match self.parent {
            None => self.slot == ROOT_SLOT,
            Some(_) => (1..=MAX_CHILDREN as u8).contains(&self.slot),
        }
    }
}

/// Closure-table row: `ancestor` sits `depth` levels above `descendant`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AncestorRow {
    pub ancestor: ParticipantId,
    pub descendant: ParticipantId,
    pub depth: u8,
}

/// Where a participant was slotted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub participant: ParticipantId,
    pub parent: Option<ParticipantId>,
    pub slot: u8,
}
