//! Tree placement service.
//!
//! Participants are slotted breadth-first under a preferred parent, so each
//! new member lands in the widest, shallowest open slot of that subtree. The
//! ancestor index of a new node is its parent's rows shifted one level down
//! plus the direct edge, capped at [`MAX_UPLINE_DEPTH`].

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tierflow_types::{
    AncestorRow, EngineError, EngineResult, ParticipantId, Placement, TreeNode, MAX_CHILDREN, MAX_UPLINE_DEPTH,
    ROOT_SLOT,
};

use crate::store::{require_participant, UnitOfWork};

/// Claim attempts per placement: the first candidate plus one retry
const CLAIM_ATTEMPTS: usize = 2;

/// Place `participant` under `preferred` (usually the sponsor).
///
/// The search starts at the first of `preferred`, `fallback_root` or the
/// existing tree root that is itself placed. With no tree at all the
/// participant becomes the root.
pub fn place(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    preferred: Option<ParticipantId>,
    fallback_root: Option<ParticipantId>,
    now: DateTime<Utc>,
) -> EngineResult<Placement> {
    let mut record = require_participant(uow, participant)?;
    if record.placed || uow.tree_node(participant)?.is_some() {
        return Err(EngineError::AlreadyPlaced(participant));
    }

    let Some(start) = search_start(uow, preferred, fallback_root)? else {
        let node = TreeNode { participant, parent: None, slot: ROOT_SLOT, placed_at: now };
        uow.claim_slot(node)?;
        record.placed = true;
        uow.put_participant(record)?;
        info!(%participant, "placed as tree root");
        return Ok(Placement { participant, parent: None, slot: ROOT_SLOT });
    };

    let mut lost: BTreeSet<(ParticipantId, u8)> = BTreeSet::new();
    for attempt in 0..CLAIM_ATTEMPTS {
        let Some((parent, slot)) = next_open_slot(uow, start, &lost)? else {
            break;
        };
        let node = TreeNode { participant, parent: Some(parent), slot, placed_at: now };
        match uow.claim_slot(node) {
            Ok(()) => {
                index_ancestors(uow, participant, parent)?;
                record.placed = true;
                record.placement_parent = Some(parent);
                uow.put_participant(record)?;
                info!(%participant, %parent, slot, sponsor = ?preferred, "participant placed");
                return Ok(Placement { participant, parent: Some(parent), slot });
            }
            Err(EngineError::PlacementConflict { parent, slot }) => {
                warn!(%participant, %parent, slot, attempt, "slot claimed concurrently, trying next candidate");
                lost.insert((parent, slot));
            }
            Err(e) => return Err(e),
        }
    }

    Err(EngineError::PlacementExhausted(participant))
}

fn search_start(
    uow: &dyn UnitOfWork,
    preferred: Option<ParticipantId>,
    fallback_root: Option<ParticipantId>,
) -> EngineResult<Option<ParticipantId>> {
    for candidate in [preferred, fallback_root].into_iter().flatten() {
        if uow.tree_node(candidate)?.is_some() {
            return Ok(Some(candidate));
        }
        debug!(%candidate, "preferred parent is not placed, falling back");
    }
    Ok(uow.root_node()?.map(|node| node.participant))
}

/// Breadth-first search for the lowest free slot, skipping slots already
/// lost to a concurrent claim.
pub fn next_open_slot(
    uow: &dyn UnitOfWork,
    start: ParticipantId,
    skip: &BTreeSet<(ParticipantId, u8)>,
) -> EngineResult<Option<(ParticipantId, u8)>> {
    let mut queue = VecDeque::from([start]);
    let mut visited = BTreeSet::new();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        let children = uow.children(current)?;
        if children.len() < MAX_CHILDREN {
            let free = (1..=MAX_CHILDREN as u8)
                .find(|slot| !children.iter().any(|c| c.slot == *slot) && !skip.contains(&(current, *slot)));
            if let Some(slot) = free {
                return Ok(Some((current, slot)));
            }
        }
        queue.extend(children.into_iter().map(|c| c.participant));
    }
    Ok(None)
}

fn index_ancestors(uow: &mut dyn UnitOfWork, participant: ParticipantId, parent: ParticipantId) -> EngineResult<()> {
    let mut rows = vec![AncestorRow { ancestor: parent, descendant: participant, depth: 1 }];
    rows.extend(
        uow.ancestors(parent)?
            .into_iter()
            .filter(|row| (row.depth as usize) < MAX_UPLINE_DEPTH)
            .map(|row| AncestorRow { ancestor: row.ancestor, descendant: participant, depth: row.depth + 1 }),
    );
    uow.insert_ancestor_rows(&rows)
}

/// Walk parent links from `participant`, returning up to `limit` ancestors
/// nearest first. Stops early on a cycle or a dangling parent.
pub fn parent_chain(uow: &dyn UnitOfWork, participant: ParticipantId, limit: usize) -> EngineResult<Vec<ParticipantId>> {
    let mut chain = Vec::with_capacity(limit);
    let mut seen = BTreeSet::from([participant]);
    let mut current = uow.tree_node(participant)?.and_then(|node| node.parent);

    while let Some(id) = current {
        if chain.len() >= limit || !seen.insert(id) {
            break;
        }
        chain.push(id);
        current = match uow.tree_node(id)? {
            Some(node) => node.parent,
            None => break,
        };
    }
    Ok(chain)
}
