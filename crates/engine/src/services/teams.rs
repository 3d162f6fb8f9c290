//! Team formation and tier promotion tracker.
//!
//! A leader's open team collects placement-direct children as they make
//! their first purchase and seals on the third. Sealing bumps the leader's
//! direct team count and starts an upward cascade of total team counts that
//! stops at the first ancestor whose recomputed total does not change.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tierflow_types::math::safe_add_u32;
use tierflow_types::{
    EngineError, EngineResult, Participant, ParticipantId, PromotionRecord, PromotionSource, Sequence, Team, TeamId,
    Tier, TierLadder,
};

use crate::store::{require_participant, UnitOfWork};

/// Effects of one first purchase on team state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamUpdate {
    pub joined: Option<TeamId>,
    pub sealed: Option<TeamId>,
    pub promotions: Vec<PromotionRecord>,
}

/// Tracks teams and raises tiers along a threshold ladder
#[derive(Debug, Clone)]
pub struct TeamTracker {
    ladder: TierLadder,
}

impl TeamTracker {
    pub fn new(ladder: TierLadder) -> Self {
        Self { ladder }
    }

    pub fn ladder(&self) -> &TierLadder {
        &self.ladder
    }

    /// Record `participant`'s first purchase in their placement parent's team
    pub fn on_first_purchase(
        &self,
        uow: &mut dyn UnitOfWork,
        participant: ParticipantId,
        now: DateTime<Utc>,
    ) -> EngineResult<TeamUpdate> {
        let Some(leader) = uow.tree_node(participant)?.and_then(|node| node.parent) else {
            debug!(%participant, "tree root has no team to join");
            return Ok(TeamUpdate::default());
        };

        let teams = uow.teams_led_by(leader)?;
        if let Some(team) = teams.iter().find(|t| t.members.contains(&participant)) {
            debug!(%participant, team = %team.id, "already a team member");
            return Ok(TeamUpdate::default());
        }

        let mut team = match teams.into_iter().find(|t| !t.is_sealed()) {
            Some(team) => team,
            None => Team {
                id: TeamId(uow.next_id(Sequence::Team)?),
                leader,
                members: Vec::new(),
                opened_at: now,
                sealed_at: None,
            },
        };
        team.members.push(participant);

        let mut update = TeamUpdate { joined: Some(team.id), ..TeamUpdate::default() };
        if !team.is_full() {
            debug!(%leader, team = %team.id, members = team.members.len(), "team member added");
            uow.put_team(team)?;
            return Ok(update);
        }

        team.sealed_at = Some(now);
        let team_id = team.id;
        uow.put_team(team)?;

        let mut record = require_participant(uow, leader)?;
        record.direct_team_count = safe_add_u32(record.direct_team_count, 1)?;
        uow.put_participant(record)?;
        info!(%leader, team = %team_id, "team sealed");

        update.sealed = Some(team_id);
        update.promotions = self.cascade(uow, leader, now)?;
        Ok(update)
    }

    /// Recompute total team counts from `start` upward.
    ///
    /// Each hop re-reads the node and its children, so it always works from
    /// committed state. Stops when a total is unchanged or the root is passed.
    pub fn cascade(
        &self,
        uow: &mut dyn UnitOfWork,
        start: ParticipantId,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PromotionRecord>> {
        let mut promotions = Vec::new();
        let mut visited = BTreeSet::new();
        let mut current = Some(start);
        let mut hops = 0usize;

        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(EngineError::Integrity(format!("placement cycle through {}", id)));
            }

            let mut participant = require_participant(uow, id)?;
            let expected = expected_total(uow, &participant)?;
            if expected == participant.total_team_count {
                break;
            }
            if expected < participant.total_team_count {
                warn!(participant = %id, recorded = participant.total_team_count, expected, "team count would decrease, keeping recorded value");
                break;
            }

            participant.total_team_count = expected;
            if let Some(record) = self.promote(&mut participant, now) {
                uow.append_promotion(record.clone())?;
                promotions.push(record);
            }
            uow.put_participant(participant)?;
            hops += 1;

            current = uow.tree_node(id)?.and_then(|node| node.parent);
        }

        debug!(%start, hops, promotions = promotions.len(), "team count cascade finished");
        Ok(promotions)
    }

    /// Raise `participant` to the tier their total team count earns.
    /// Returns the promotion record when the tier went up.
    fn promote(&self, participant: &mut Participant, now: DateTime<Utc>) -> Option<PromotionRecord> {
        let earned = self.ladder.tier_for(participant.total_team_count);
        if earned <= participant.tier {
            return None;
        }
        let record = PromotionRecord {
            participant: participant.id,
            from: participant.tier,
            to: earned,
            total_team_count: participant.total_team_count,
            source: PromotionSource::TeamCount,
            reason: None,
            promoted_at: now,
        };
        info!(
            participant = %participant.id,
            from = %record.from,
            to = %record.to,
            total_team_count = participant.total_team_count,
            "participant promoted"
        );
        participant.tier = earned;
        Some(record)
    }

    /// Administrator tier override. Tiers only go up.
    pub fn override_tier(
        &self,
        uow: &mut dyn UnitOfWork,
        participant: ParticipantId,
        tier: Tier,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<PromotionRecord> {
        let mut record = require_participant(uow, participant)?;
        if tier <= record.tier {
            return Err(EngineError::transition(format!("tier of {}", participant), record.tier, tier));
        }

        let promotion = PromotionRecord {
            participant,
            from: record.tier,
            to: tier,
            total_team_count: record.total_team_count,
            source: PromotionSource::Administrator,
            reason,
            promoted_at: now,
        };
        record.tier = tier;
        record.tier_overridden = true;
        uow.put_participant(record)?;
        uow.append_promotion(promotion.clone())?;

        info!(%participant, from = %promotion.from, to = %tier, "tier raised by administrator");
        Ok(promotion)
    }
}

/// Own sealed teams plus every placement-direct child's total
pub fn expected_total(uow: &dyn UnitOfWork, participant: &Participant) -> EngineResult<u32> {
    let mut total = participant.direct_team_count;
    for child in uow.children(participant.id)? {
        let child = require_participant(uow, child.participant)?;
        total = safe_add_u32(total, child.total_team_count)?;
    }
    Ok(total)
}
