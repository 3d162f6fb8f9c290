//! Rewards engine facade.
//!
//! [`RewardsEngine`] is the single entry point for purchase events,
//! administrator commands and batch jobs. Each trigger runs in one unit of
//! work, except batch jobs, which give every item its own so one failing
//! item cannot roll back its siblings.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use tierflow_types::{
    AncestorRow, DistributionResult, EngineError, EngineResult, HealthReport, Installment, InstallmentState, JobKind,
    JobRun, LedgerEntry, PaidPurchase, Participant, ParticipantId, Pool, PoolDistribution, PoolId, PromotionRecord,
    Team, Tier, TierLadder, TreeNode, Withdrawal, YearMonth,
};

use crate::admin::{AdminCommand, AdminOutcome};
use crate::config::EngineConfig;
use crate::jobs::JobTracker;
use crate::services::{eligibility, pool, self_income, withdrawals, Auditor, Distributor, Settlement, TeamTracker};
use crate::store::{require_participant, Store};

pub struct RewardsEngine<S: Store> {
    store: S,
    config: EngineConfig,
    distributor: Distributor,
    teams: TeamTracker,
    auditor: Auditor,
}

impl<S: Store> RewardsEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let ladder: TierLadder = config.tier_ladder()?;
        let teams = TeamTracker::new(ladder);
        let distributor = Distributor::new(config.clone(), teams.clone());
        let auditor = Auditor::new(ladder, config.auto_correct_cap, config.min_monthly_purchase);
        info!(thresholds = ?ladder.thresholds(), root = ?config.root_participant, "rewards engine ready");
        Ok(Self { store, config, distributor, teams, auditor })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    /// Create a participant. The sponsor, when given, must already exist.
    pub fn register_participant(
        &self,
        id: ParticipantId,
        sponsor: Option<ParticipantId>,
        now: DateTime<Utc>,
    ) -> EngineResult<Participant> {
        self.store.transact(|uow| {
            if uow.participant(id)?.is_some() {
                return Err(EngineError::AlreadyRegistered(id));
            }
            if let Some(sponsor) = sponsor {
                if sponsor == id {
                    return Err(EngineError::invalid("sponsor", sponsor, "a participant other than the registrant"));
                }
                require_participant(uow, sponsor)?;
            }
            let participant = Participant::new(id, sponsor, now);
            uow.put_participant(participant.clone())?;
            info!(participant = %id, sponsor = ?sponsor, "participant registered");
            Ok(participant)
        })
    }

    /// Process a verified payment. Re-delivery of the same purchase returns
    /// the stored result and writes nothing.
    #[instrument(skip_all, fields(purchase = %purchase.id, participant = %purchase.participant))]
    pub fn on_purchase_paid(&self, purchase: &PaidPurchase) -> EngineResult<DistributionResult> {
        self.store.transact(|uow| self.distributor.distribute(uow, purchase))
    }

    pub fn request_withdrawal(
        &self,
        participant: ParticipantId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Withdrawal> {
        self.store
            .transact(|uow| withdrawals::request(uow, participant, amount, self.config.min_withdrawal, now))
    }

    pub fn on_admin_command(&self, command: AdminCommand, now: DateTime<Utc>) -> EngineResult<AdminOutcome> {
        info!(?command, "administrator command");
        match command {
            AdminCommand::DistributePool { pool } => self.distribute_pool(pool, now).map(AdminOutcome::PoolDistributed),
            AdminCommand::ApproveWithdrawal { withdrawal } => self
                .store
                .transact(|uow| withdrawals::approve(uow, withdrawal, now))
                .map(AdminOutcome::WithdrawalDecided),
            AdminCommand::RejectWithdrawal { withdrawal, reason } => self
                .store
                .transact(|uow| withdrawals::reject(uow, withdrawal, reason, now))
                .map(AdminOutcome::WithdrawalDecided),
            AdminCommand::OverrideTier { participant, tier, reason } => {
                if !tier.is_ranked() || Tier::new(tier.get()).is_none() {
                    return Err(EngineError::invalid("tier", tier.get(), "1..=5"));
                }
                self.store
                    .transact(|uow| self.teams.override_tier(uow, participant, tier, reason, now))
                    .map(AdminOutcome::TierRaised)
            }
            AdminCommand::OverrideInstallment { installment, state, note } => self
                .store
                .transact(|uow| self_income::override_state(uow, installment, state, note, now))
                .map(AdminOutcome::InstallmentOverridden),
            AdminCommand::SetKycStatus { participant, status } => self
                .store
                .transact(|uow| eligibility::set_kyc_status(uow, participant, status))
                .map(AdminOutcome::KycUpdated),
            AdminCommand::ForceReconciliation => self.run_reconciliation(now).map(AdminOutcome::Reconciled),
        }
    }

    /// Close a pool and pay it out; recorded as a pool-distribution job
    pub fn distribute_pool(&self, pool_id: PoolId, now: DateTime<Utc>) -> EngineResult<PoolDistribution> {
        let mut tracker = JobTracker::start(JobKind::PoolDistribution, now);
        let outcome = self.store.transact(|uow| pool::distribute(uow, pool_id, now));
        match &outcome {
            Ok(distribution) => {
                tracker.succeeded();
                tracker.note(format!("{} credits, {} retained", distribution.credits_written, distribution.retained_total()));
            }
            Err(e) => tracker.failed(format!("{}: {}", pool_id, e)),
        }
        self.record_job(tracker.finish(now))?;
        outcome
    }

    // ------------------------------------------------------------------
    // Batch jobs
    // ------------------------------------------------------------------

    /// Settle every due or pending installment. Failures are recorded per
    /// item and retried on later runs until the retry limit.
    pub fn run_installment_settlement(&self, now: DateTime<Utc>) -> EngineResult<JobRun> {
        let mut tracker = JobTracker::start(JobKind::InstallmentSettlement, now);
        let keys = self.store.transact(|uow| self_income::due(uow, now))?;
        let (mut paid, mut pending) = (0u32, 0u32);

        for key in keys {
            match self.store.transact(|uow| self_income::settle(uow, key, now)) {
                Ok(Settlement::Paid) => {
                    paid += 1;
                    tracker.succeeded();
                }
                Ok(Settlement::Pending) => {
                    pending += 1;
                    tracker.succeeded();
                }
                Ok(Settlement::AlreadySettled) => tracker.succeeded(),
                Err(failure) => {
                    let max_retries = self.config.installment_max_retries;
                    let state = self
                        .store
                        .transact(|uow| self_income::record_failure(uow, key, &failure, max_retries, now));
                    match state {
                        Ok(state) => tracker.failed(format!("{}#{}: {} ({:?})", key.purchase, key.sequence, failure, state)),
                        Err(e) => {
                            error!(purchase = %key.purchase, sequence = key.sequence, error = %e, "could not record installment failure");
                            tracker.failed(format!("{}#{}: {}; recording failed: {}", key.purchase, key.sequence, failure, e));
                        }
                    }
                }
            }
        }

        tracker.note(format!("{} paid, {} pending eligibility", paid, pending));
        let run = tracker.finish(now);
        self.record_job(run.clone())?;
        Ok(run)
    }

    /// Recompute every participant's monthly eligibility for `period`
    pub fn run_monthly_rollup(&self, period: YearMonth, now: DateTime<Utc>) -> EngineResult<JobRun> {
        let mut tracker = JobTracker::start(JobKind::MonthlyEligibility, now);
        let ids: Vec<ParticipantId> =
            self.store.transact(|uow| Ok(uow.participants()?.into_iter().map(|p| p.id).collect()))?;
        let min = self.config.min_monthly_purchase;
        let mut eligible = 0u32;

        for id in ids {
            match self.store.transact(|uow| eligibility::refresh(uow, id, period, min)) {
                Ok(flag) => {
                    eligible += u32::from(flag);
                    tracker.succeeded();
                }
                Err(e) => tracker.failed(format!("{}: {}", id, e)),
            }
        }

        tracker.note(format!("{} eligible for {}", eligible, period));
        let run = tracker.finish(now);
        self.record_job(run.clone())?;
        Ok(run)
    }

    /// Audit the store, applying capped corrections
    pub fn run_reconciliation(&self, now: DateTime<Utc>) -> EngineResult<HealthReport> {
        let mut tracker = JobTracker::start(JobKind::Reconciliation, now);
        let outcome = self.store.transact(|uow| self.auditor.run(uow, now));
        match &outcome {
            Ok(report) => {
                tracker.succeeded();
                tracker.note(format!("score {}, {} findings, {} corrected", report.score, report.findings.len(), report.corrections));
            }
            Err(e) => tracker.failed(e.to_string()),
        }
        self.record_job(tracker.finish(now))?;
        outcome
    }

    fn record_job(&self, run: JobRun) -> EngineResult<()> {
        self.store.transact(|uow| uow.append_job_run(run))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn participant(&self, id: ParticipantId) -> EngineResult<Participant> {
        self.store.transact(|uow| require_participant(uow, id))
    }

    pub fn tree_node(&self, id: ParticipantId) -> EngineResult<Option<TreeNode>> {
        self.store.transact(|uow| uow.tree_node(id))
    }

    pub fn children(&self, id: ParticipantId) -> EngineResult<Vec<TreeNode>> {
        self.store.transact(|uow| uow.children(id))
    }

    pub fn ancestors(&self, id: ParticipantId) -> EngineResult<Vec<AncestorRow>> {
        self.store.transact(|uow| uow.ancestors(id))
    }

    /// Ledger of one participant, or of the company for `None`
    pub fn ledger(&self, participant: Option<ParticipantId>) -> EngineResult<Vec<LedgerEntry>> {
        self.store.transact(|uow| uow.entries_for(participant))
    }

    pub fn installments(&self, participant: ParticipantId) -> EngineResult<Vec<Installment>> {
        self.store.transact(|uow| uow.installments_for(participant))
    }

    pub fn installments_in_state(&self, state: InstallmentState) -> EngineResult<Vec<Installment>> {
        self.store.transact(|uow| uow.installments_in_state(state))
    }

    pub fn teams_led_by(&self, leader: ParticipantId) -> EngineResult<Vec<Team>> {
        self.store.transact(|uow| uow.teams_led_by(leader))
    }

    pub fn promotions(&self, participant: ParticipantId) -> EngineResult<Vec<PromotionRecord>> {
        self.store.transact(|uow| uow.promotions_for(participant))
    }

    pub fn open_pool(&self) -> EngineResult<Option<Pool>> {
        self.store.transact(|uow| uow.open_pool())
    }

    pub fn pool(&self, id: PoolId) -> EngineResult<Pool> {
        self.store.transact(|uow| uow.pool(id)?.ok_or(EngineError::UnknownPool(id)))
    }

    pub fn withdrawals(&self, participant: ParticipantId) -> EngineResult<Vec<Withdrawal>> {
        self.store.transact(|uow| uow.withdrawals_for(participant))
    }

    pub fn job_runs(&self) -> EngineResult<Vec<JobRun>> {
        self.store.transact(|uow| uow.job_runs())
    }

    pub fn latest_health_report(&self) -> EngineResult<Option<HealthReport>> {
        self.store.transact(|uow| uow.latest_health_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> RewardsEngine<MemoryStore> {
        RewardsEngine::new(MemoryStore::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates_and_unknown_sponsors() {
        let engine = engine();
        let now = Utc::now();
        engine.register_participant(ParticipantId(1), None, now).unwrap();

        assert_eq!(
            engine.register_participant(ParticipantId(1), None, now),
            Err(EngineError::AlreadyRegistered(ParticipantId(1)))
        );
        assert_eq!(
            engine.register_participant(ParticipantId(2), Some(ParticipantId(9)), now),
            Err(EngineError::UnknownParticipant(ParticipantId(9)))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig { pool_share_bps: -1, ..EngineConfig::default() };
        assert!(RewardsEngine::new(MemoryStore::new(), config).is_err());
    }

    #[test]
    fn test_pool_distribution_writes_job_record() {
        let engine = engine();
        let missing = engine.distribute_pool(PoolId(7), Utc::now());
        assert_eq!(missing, Err(EngineError::UnknownPool(PoolId(7))));

        let runs = engine.job_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].kind, JobKind::PoolDistribution);
        assert_eq!(runs[0].status, tierflow_types::JobStatus::Failed);
    }
}
