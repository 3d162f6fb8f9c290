//! A store that injects failures into selected unit-of-work calls while
//! delegating everything else to a [`MemoryStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use tierflow_engine::{MemoryStore, Store, UnitOfWork};
use tierflow_types::{
    Amount, AncestorRow, DistributionResult, EngineError, EngineResult, HealthReport, Installment, InstallmentKey,
    InstallmentState, JobRun, LedgerEntry, Participant, ParticipantId, Pool, PoolId, PromotionRecord, Purchase,
    PurchaseId, Sequence, Team, TeamId, TreeNode, Withdrawal, WithdrawalId,
};

#[derive(Debug, Default)]
pub struct Faults {
    /// Upcoming `claim_slot` calls that lose their race
    pub slot_conflicts: usize,
    /// Ledger ref keys whose append fails with a storage error
    pub failing_refs: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }
}

impl Store for FaultyStore {
    fn transact<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
    {
        self.inner.transact(|uow| {
            let mut unit = FaultyUnit { inner: uow, faults: &self.faults };
            work(&mut unit)
        })
    }
}

struct FaultyUnit<'a> {
    inner: &'a mut dyn UnitOfWork,
    faults: &'a Mutex<Faults>,
}

impl UnitOfWork for FaultyUnit<'_> {
    fn next_id(&mut self, sequence: Sequence) -> EngineResult<u64> {
        self.inner.next_id(sequence)
    }

    fn participant(&self, id: ParticipantId) -> EngineResult<Option<Participant>> {
        self.inner.participant(id)
    }

    fn put_participant(&mut self, participant: Participant) -> EngineResult<()> {
        self.inner.put_participant(participant)
    }

    fn participants(&self) -> EngineResult<Vec<Participant>> {
        self.inner.participants()
    }

    fn participant_by_referral_code(&self, code: &str) -> EngineResult<Option<ParticipantId>> {
        self.inner.participant_by_referral_code(code)
    }

    fn tree_node(&self, id: ParticipantId) -> EngineResult<Option<TreeNode>> {
        self.inner.tree_node(id)
    }

    fn tree_nodes(&self) -> EngineResult<Vec<TreeNode>> {
        self.inner.tree_nodes()
    }

    fn root_node(&self) -> EngineResult<Option<TreeNode>> {
        self.inner.root_node()
    }

    fn children(&self, parent: ParticipantId) -> EngineResult<Vec<TreeNode>> {
        self.inner.children(parent)
    }

    fn claim_slot(&mut self, node: TreeNode) -> EngineResult<()> {
        let mut faults = self.faults.lock().unwrap();
        if faults.slot_conflicts > 0 {
            faults.slot_conflicts -= 1;
            return Err(EngineError::PlacementConflict {
                parent: node.parent.unwrap_or(node.participant),
                slot: node.slot,
            });
        }
        drop(faults);
        self.inner.claim_slot(node)
    }

    fn ancestors(&self, descendant: ParticipantId) -> EngineResult<Vec<AncestorRow>> {
        self.inner.ancestors(descendant)
    }

    fn insert_ancestor_rows(&mut self, rows: &[AncestorRow]) -> EngineResult<()> {
        self.inner.insert_ancestor_rows(rows)
    }

    fn purchase(&self, id: PurchaseId) -> EngineResult<Option<Purchase>> {
        self.inner.purchase(id)
    }

    fn distribution(&self, id: PurchaseId) -> EngineResult<Option<DistributionResult>> {
        self.inner.distribution(id)
    }

    fn insert_purchase(&mut self, purchase: Purchase, result: DistributionResult) -> EngineResult<()> {
        self.inner.insert_purchase(purchase, result)
    }

    fn purchases_of(&self, participant: ParticipantId) -> EngineResult<Vec<Purchase>> {
        self.inner.purchases_of(participant)
    }

    fn entry_by_ref(&self, ref_key: &str) -> EngineResult<Option<LedgerEntry>> {
        self.inner.entry_by_ref(ref_key)
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> EngineResult<()> {
        if self.faults.lock().unwrap().failing_refs.contains(&entry.ref_key) {
            return Err(EngineError::Storage(format!("write of {} timed out", entry.ref_key)));
        }
        self.inner.append_entry(entry)
    }

    fn entries_for(&self, participant: Option<ParticipantId>) -> EngineResult<Vec<LedgerEntry>> {
        self.inner.entries_for(participant)
    }

    fn ledger_totals(&self) -> EngineResult<BTreeMap<ParticipantId, Amount>> {
        self.inner.ledger_totals()
    }

    fn installment(&self, key: InstallmentKey) -> EngineResult<Option<Installment>> {
        self.inner.installment(key)
    }

    fn put_installment(&mut self, installment: Installment) -> EngineResult<()> {
        self.inner.put_installment(installment)
    }

    fn installments_for(&self, participant: ParticipantId) -> EngineResult<Vec<Installment>> {
        self.inner.installments_for(participant)
    }

    fn installments_in_state(&self, state: InstallmentState) -> EngineResult<Vec<Installment>> {
        self.inner.installments_in_state(state)
    }

    fn team(&self, id: TeamId) -> EngineResult<Option<Team>> {
        self.inner.team(id)
    }

    fn teams_led_by(&self, leader: ParticipantId) -> EngineResult<Vec<Team>> {
        self.inner.teams_led_by(leader)
    }

    fn put_team(&mut self, team: Team) -> EngineResult<()> {
        self.inner.put_team(team)
    }

    fn append_promotion(&mut self, record: PromotionRecord) -> EngineResult<()> {
        self.inner.append_promotion(record)
    }

    fn promotions_for(&self, participant: ParticipantId) -> EngineResult<Vec<PromotionRecord>> {
        self.inner.promotions_for(participant)
    }

    fn open_pool(&self) -> EngineResult<Option<Pool>> {
        self.inner.open_pool()
    }

    fn pool(&self, id: PoolId) -> EngineResult<Option<Pool>> {
        self.inner.pool(id)
    }

    fn put_pool(&mut self, pool: Pool) -> EngineResult<()> {
        self.inner.put_pool(pool)
    }

    fn withdrawal(&self, id: WithdrawalId) -> EngineResult<Option<Withdrawal>> {
        self.inner.withdrawal(id)
    }

    fn put_withdrawal(&mut self, withdrawal: Withdrawal) -> EngineResult<()> {
        self.inner.put_withdrawal(withdrawal)
    }

    fn withdrawals_for(&self, participant: ParticipantId) -> EngineResult<Vec<Withdrawal>> {
        self.inner.withdrawals_for(participant)
    }

    fn append_job_run(&mut self, run: JobRun) -> EngineResult<()> {
        self.inner.append_job_run(run)
    }

    fn job_runs(&self) -> EngineResult<Vec<JobRun>> {
        self.inner.job_runs()
    }

    fn append_health_report(&mut self, report: HealthReport) -> EngineResult<()> {
        self.inner.append_health_report(report)
    }

    fn latest_health_report(&self) -> EngineResult<Option<HealthReport>> {
        self.inner.latest_health_report()
    }
}
