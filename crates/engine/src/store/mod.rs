//! Storage port.
//!
//! Every multi-entity mutation runs inside one unit of work: the closure
//! passed to [`Store::transact`] either returns `Ok` and all of its writes
//! become visible together, or returns `Err` and none of them do.

pub mod memory;
pub mod snapshot;

use std::collections::BTreeMap;
use std::sync::Arc;

use tierflow_types::{
    Amount, AncestorRow, DistributionResult, EngineResult, HealthReport, Installment, InstallmentKey,
    InstallmentState, JobRun, LedgerEntry, Participant, ParticipantId, Pool, PoolId, PromotionRecord,
    Purchase, PurchaseId, Sequence, Team, TeamId, TreeNode, Withdrawal, WithdrawalId,
};

pub use memory::MemoryStore;
pub use snapshot::Snapshot;

/// Repository operations available inside a unit of work
pub trait UnitOfWork {
    /// Next value of a store sequence, starting at 1
    fn next_id(&mut self, sequence: Sequence) -> EngineResult<u64>;

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    fn participant(&self, id: ParticipantId) -> EngineResult<Option<Participant>>;

    fn put_participant(&mut self, participant: Participant) -> EngineResult<()>;

    fn participants(&self) -> EngineResult<Vec<Participant>>;

    fn participant_by_referral_code(&self, code: &str) -> EngineResult<Option<ParticipantId>>;

    // ------------------------------------------------------------------
    // Placement tree and ancestor index
    // ------------------------------------------------------------------

    fn tree_node(&self, id: ParticipantId) -> EngineResult<Option<TreeNode>>;

    fn tree_nodes(&self) -> EngineResult<Vec<TreeNode>>;

    fn root_node(&self) -> EngineResult<Option<TreeNode>>;

    /// Direct children in slot order
    fn children(&self, parent: ParticipantId) -> EngineResult<Vec<TreeNode>>;

    /// Insert a node only if its slot is still free (compare-and-set)
    fn claim_slot(&mut self, node: TreeNode) -> EngineResult<()>;

    /// Indexed ancestors of `descendant`, depth 1 first
    fn ancestors(&self, descendant: ParticipantId) -> EngineResult<Vec<AncestorRow>>;

    fn insert_ancestor_rows(&mut self, rows: &[AncestorRow]) -> EngineResult<()>;

    // ------------------------------------------------------------------
    // Purchases
    // ------------------------------------------------------------------

    fn purchase(&self, id: PurchaseId) -> EngineResult<Option<Purchase>>;

    fn distribution(&self, id: PurchaseId) -> EngineResult<Option<DistributionResult>>;

    fn insert_purchase(&mut self, purchase: Purchase, result: DistributionResult) -> EngineResult<()>;

    fn purchases_of(&self, participant: ParticipantId) -> EngineResult<Vec<Purchase>>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    fn entry_by_ref(&self, ref_key: &str) -> EngineResult<Option<LedgerEntry>>;

    /// Append one entry; a duplicate ref key is rejected
    fn append_entry(&mut self, entry: LedgerEntry) -> EngineResult<()>;

    /// Entries of one participant, or of the company for `None`
    fn entries_for(&self, participant: Option<ParticipantId>) -> EngineResult<Vec<LedgerEntry>>;

    /// Sum of entries per participant (company excluded)
    fn ledger_totals(&self) -> EngineResult<BTreeMap<ParticipantId, Amount>>;

    // ------------------------------------------------------------------
    // Installments
    // ------------------------------------------------------------------

    fn installment(&self, key: InstallmentKey) -> EngineResult<Option<Installment>>;

    fn put_installment(&mut self, installment: Installment) -> EngineResult<()>;

    fn installments_for(&self, participant: ParticipantId) -> EngineResult<Vec<Installment>>;

    fn installments_in_state(&self, state: InstallmentState) -> EngineResult<Vec<Installment>>;

    // ------------------------------------------------------------------
    // Teams and promotions
    // ------------------------------------------------------------------

    fn team(&self, id: TeamId) -> EngineResult<Option<Team>>;

    fn teams_led_by(&self, leader: ParticipantId) -> EngineResult<Vec<Team>>;

    fn put_team(&mut self, team: Team) -> EngineResult<()>;

    fn append_promotion(&mut self, record: PromotionRecord) -> EngineResult<()>;

    fn promotions_for(&self, participant: ParticipantId) -> EngineResult<Vec<PromotionRecord>>;

    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    fn open_pool(&self) -> EngineResult<Option<Pool>>;

    fn pool(&self, id: PoolId) -> EngineResult<Option<Pool>>;

    fn put_pool(&mut self, pool: Pool) -> EngineResult<()>;

    // ------------------------------------------------------------------
    // Withdrawals
    // ------------------------------------------------------------------

    fn withdrawal(&self, id: WithdrawalId) -> EngineResult<Option<Withdrawal>>;

    fn put_withdrawal(&mut self, withdrawal: Withdrawal) -> EngineResult<()>;

    fn withdrawals_for(&self, participant: ParticipantId) -> EngineResult<Vec<Withdrawal>>;

    // ------------------------------------------------------------------
    // Job and audit records
    // ------------------------------------------------------------------

    fn append_job_run(&mut self, run: JobRun) -> EngineResult<()>;

    fn job_runs(&self) -> EngineResult<Vec<JobRun>>;

    fn append_health_report(&mut self, report: HealthReport) -> EngineResult<()>;

    fn latest_health_report(&self) -> EngineResult<Option<HealthReport>>;
}

/// Transactional store
pub trait Store: Send + Sync {
    /// Run `work` as one atomic, isolated unit of work
    fn transact<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>;
}

impl<S: Store> Store for Arc<S> {
    fn transact<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
    {
        (**self).transact(work)
    }
}

/// Load a participant or fail with `UnknownParticipant`
pub fn require_participant(uow: &dyn UnitOfWork, id: ParticipantId) -> EngineResult<Participant> {
    uow.participant(id)?
        .ok_or(tierflow_types::EngineError::UnknownParticipant(id))
}
