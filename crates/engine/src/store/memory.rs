//! In-memory store.
//!
//! Tables live behind one mutex, so units of work are fully serialized. Each
//! write made through a [`MemoryTx`] pushes an undo closure onto a journal;
//! if the unit of work does not commit (error or panic) the journal is
//! replayed in reverse when the transaction is dropped.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use tierflow_types::{
    Amount, AncestorRow, DistributionResult, EngineError, EngineResult, HealthReport, Installment,
    InstallmentKey, InstallmentState, JobRun, LedgerEntry, Participant, ParticipantId, Pool, PoolId,
    PromotionRecord, Purchase, PurchaseId, Sequence, Team, TeamId, TreeNode, Withdrawal, WithdrawalId,
    MAX_CHILDREN,
};

use super::snapshot::{Snapshot, StoredPurchase};
use super::{Store, UnitOfWork};

/// Table set held by the memory store
#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub(crate) sequences: BTreeMap<Sequence, u64>,
    pub(crate) participants: BTreeMap<ParticipantId, Participant>,
    pub(crate) referral_codes: BTreeMap<String, ParticipantId>,
    pub(crate) tree: BTreeMap<ParticipantId, TreeNode>,
    /// (parent, slot) -> child
    pub(crate) slots: BTreeMap<(ParticipantId, u8), ParticipantId>,
    /// (descendant, depth) -> ancestor
    pub(crate) ancestors: BTreeMap<(ParticipantId, u8), ParticipantId>,
    pub(crate) purchases: BTreeMap<PurchaseId, Purchase>,
    pub(crate) distributions: BTreeMap<PurchaseId, DistributionResult>,
    pub(crate) ledger: BTreeMap<u64, LedgerEntry>,
    pub(crate) ledger_refs: BTreeMap<String, u64>,
    pub(crate) installments: BTreeMap<InstallmentKey, Installment>,
    pub(crate) teams: BTreeMap<TeamId, Team>,
    pub(crate) promotions: BTreeMap<u64, PromotionRecord>,
    pub(crate) pools: BTreeMap<PoolId, Pool>,
    pub(crate) withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    pub(crate) job_runs: BTreeMap<u64, JobRun>,
    pub(crate) health_reports: BTreeMap<u64, HealthReport>,
}

macro_rules! table_accessors {
    ($($name:ident: $key:ty => $value:ty),* $(,)?) => {
        mod table {
            use super::*;
            $(
                pub(super) fn $name(tables: &mut Tables) -> &mut BTreeMap<$key, $value> {
                    &mut tables.$name
                }
            )*
        }
    };
}

table_accessors!(
    sequences: Sequence => u64,
    participants: ParticipantId => Participant,
    referral_codes: String => ParticipantId,
    tree: ParticipantId => TreeNode,
    slots: (ParticipantId, u8) => ParticipantId,
    ancestors: (ParticipantId, u8) => ParticipantId,
    purchases: PurchaseId => Purchase,
    distributions: PurchaseId => DistributionResult,
    ledger: u64 => LedgerEntry,
    ledger_refs: String => u64,
    installments: InstallmentKey => Installment,
    teams: TeamId => Team,
    promotions: u64 => PromotionRecord,
    pools: PoolId => Pool,
    withdrawals: WithdrawalId => Withdrawal,
    job_runs: u64 => JobRun,
    health_reports: u64 => HealthReport,
);

type Undo = Box<dyn FnOnce(&mut Tables) + Send>;

/// A unit of work over the memory tables
pub struct MemoryTx<'a> {
    tables: &'a mut Tables,
    journal: Vec<Undo>,
    committed: bool,
}

impl<'a> MemoryTx<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self { tables, journal: Vec::new(), committed: false }
    }

    /// Insert into a table, journaling the previous value
    fn put<K, V>(&mut self, table: fn(&mut Tables) -> &mut BTreeMap<K, V>, key: K, value: V)
    where
        K: Ord + Clone + Send + 'static,
        V: Send + 'static,
    {
        let previous = table(self.tables).insert(key.clone(), value);
        self.journal.push(Box::new(move |tables: &mut Tables| {
            let map = table(tables);
            match previous {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }));
    }

    fn commit(mut self) {
        debug!(writes = self.journal.len(), "committing unit of work");
        self.journal.clear();
        self.committed = true;
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.committed || self.journal.is_empty() {
            return;
        }
        debug!(writes = self.journal.len(), "rolling back unit of work");
        while let Some(undo) = self.journal.pop() {
            undo(self.tables);
        }
    }
}

impl UnitOfWork for MemoryTx<'_> {
    fn next_id(&mut self, sequence: Sequence) -> EngineResult<u64> {
        let current = self.tables.sequences.get(&sequence).copied().unwrap_or(0);
        let next = current.checked_add(1).ok_or(EngineError::Arithmetic("next_id"))?;
        self.put(table::sequences, sequence, next);
        Ok(next)
    }

    fn participant(&self, id: ParticipantId) -> EngineResult<Option<Participant>> {
        Ok(self.tables.participants.get(&id).cloned())
    }

    fn put_participant(&mut self, participant: Participant) -> EngineResult<()> {
        if let Some(code) = &participant.referral_code {
            match self.tables.referral_codes.get(code) {
                Some(owner) if *owner != participant.id => {
                    return Err(EngineError::Integrity(format!("referral code {} already belongs to {}", code, owner)));
                }
                Some(_) => {}
                None => self.put(table::referral_codes, code.clone(), participant.id),
            }
        }
        self.put(table::participants, participant.id, participant);
        Ok(())
    }

    fn participants(&self) -> EngineResult<Vec<Participant>> {
        Ok(self.tables.participants.values().cloned().collect())
    }

    fn participant_by_referral_code(&self, code: &str) -> EngineResult<Option<ParticipantId>> {
        Ok(self.tables.referral_codes.get(code).copied())
    }

    fn tree_node(&self, id: ParticipantId) -> EngineResult<Option<TreeNode>> {
        Ok(self.tables.tree.get(&id).cloned())
    }

    fn tree_nodes(&self) -> EngineResult<Vec<TreeNode>> {
        Ok(self.tables.tree.values().cloned().collect())
    }

    fn root_node(&self) -> EngineResult<Option<TreeNode>> {
        Ok(self.tables.tree.values().find(|node| node.is_root()).cloned())
    }

    fn children(&self, parent: ParticipantId) -> EngineResult<Vec<TreeNode>> {
        self.tables
            .slots
            .range((parent, 0)..=(parent, u8::MAX))
            .map(|(_, child)| {
                self.tables
                    .tree
                    .get(child)
                    .cloned()
                    .ok_or_else(|| EngineError::Integrity(format!("slot index points at unplaced {}", child)))
            })
            .collect()
    }

    fn claim_slot(&mut self, node: TreeNode) -> EngineResult<()> {
        if self.tables.tree.contains_key(&node.participant) {
            return Err(EngineError::AlreadyPlaced(node.participant));
        }
        if !node.slot_in_bounds() {
            return Err(EngineError::invalid("slot", node.slot, "1..=3 under a parent, 0 at the root"));
        }
        match node.parent {
            None => {
                if let Some(root) = self.tables.tree.values().find(|n| n.is_root()) {
                    return Err(EngineError::Integrity(format!("tree already has root {}", root.participant)));
                }
            }
            Some(parent) => {
                if !self.tables.tree.contains_key(&parent) {
                    return Err(EngineError::Integrity(format!("placement parent {} is not in the tree", parent)));
                }
                if self.tables.slots.contains_key(&(parent, node.slot)) {
                    return Err(EngineError::PlacementConflict { parent, slot: node.slot });
                }
                let occupied = self.tables.slots.range((parent, 0)..=(parent, u8::MAX)).count();
                if occupied >= MAX_CHILDREN {
                    return Err(EngineError::PlacementConflict { parent, slot: node.slot });
                }
                self.put(table::slots, (parent, node.slot), node.participant);
            }
        }
        self.put(table::tree, node.participant, node);
        Ok(())
    }

    fn ancestors(&self, descendant: ParticipantId) -> EngineResult<Vec<AncestorRow>> {
        Ok(self
            .tables
            .ancestors
            .range((descendant, 0)..=(descendant, u8::MAX))
            .map(|(&(descendant, depth), &ancestor)| AncestorRow { ancestor, descendant, depth })
            .collect())
    }

    fn insert_ancestor_rows(&mut self, rows: &[AncestorRow]) -> EngineResult<()> {
        for row in rows {
            if self.tables.ancestors.contains_key(&(row.descendant, row.depth)) {
                return Err(EngineError::Integrity(format!(
                    "ancestor row for {} at depth {} already exists",
                    row.descendant, row.depth
                )));
            }
            self.put(table::ancestors, (row.descendant, row.depth), row.ancestor);
        }
        Ok(())
    }

    fn purchase(&self, id: PurchaseId) -> EngineResult<Option<Purchase>> {
        Ok(self.tables.purchases.get(&id).cloned())
    }

    fn distribution(&self, id: PurchaseId) -> EngineResult<Option<DistributionResult>> {
        Ok(self.tables.distributions.get(&id).cloned())
    }

    fn insert_purchase(&mut self, purchase: Purchase, result: DistributionResult) -> EngineResult<()> {
        if self.tables.purchases.contains_key(&purchase.id) {
            return Err(EngineError::Integrity(format!("purchase {} already recorded", purchase.id)));
        }
        self.put(table::distributions, purchase.id, result);
        self.put(table::purchases, purchase.id, purchase);
        Ok(())
    }

    fn purchases_of(&self, participant: ParticipantId) -> EngineResult<Vec<Purchase>> {
        Ok(self
            .tables
            .purchases
            .values()
            .filter(|p| p.participant == participant)
            .cloned()
            .collect())
    }

    fn entry_by_ref(&self, ref_key: &str) -> EngineResult<Option<LedgerEntry>> {
        Ok(self
            .tables
            .ledger_refs
            .get(ref_key)
            .and_then(|seq| self.tables.ledger.get(seq))
            .cloned())
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> EngineResult<()> {
        if self.tables.ledger_refs.contains_key(&entry.ref_key) {
            return Err(EngineError::DuplicateRefKey(entry.ref_key));
        }
        if self.tables.ledger.contains_key(&entry.seq) {
            return Err(EngineError::Integrity(format!("ledger sequence {} reused", entry.seq)));
        }
        self.put(table::ledger_refs, entry.ref_key.clone(), entry.seq);
        self.put(table::ledger, entry.seq, entry);
        Ok(())
    }

    fn entries_for(&self, participant: Option<ParticipantId>) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self
            .tables
            .ledger
            .values()
            .filter(|e| e.participant == participant)
            .cloned()
            .collect())
    }

    fn ledger_totals(&self) -> EngineResult<BTreeMap<ParticipantId, Amount>> {
        let mut totals: BTreeMap<ParticipantId, Amount> = BTreeMap::new();
        for entry in self.tables.ledger.values() {
            if let Some(participant) = entry.participant {
                let total = totals.entry(participant).or_insert(0);
                *total = total.checked_add(entry.amount).ok_or(EngineError::Arithmetic("ledger_totals"))?;
            }
        }
        Ok(totals)
    }

    fn installment(&self, key: InstallmentKey) -> EngineResult<Option<Installment>> {
        Ok(self.tables.installments.get(&key).cloned())
    }

    fn put_installment(&mut self, installment: Installment) -> EngineResult<()> {
        self.put(table::installments, installment.key, installment);
        Ok(())
    }

    fn installments_for(&self, participant: ParticipantId) -> EngineResult<Vec<Installment>> {
        Ok(self
            .tables
            .installments
            .values()
            .filter(|i| i.participant == participant)
            .cloned()
            .collect())
    }

    fn installments_in_state(&self, state: InstallmentState) -> EngineResult<Vec<Installment>> {
        Ok(self
            .tables
            .installments
            .values()
            .filter(|i| i.state == state)
            .cloned()
            .collect())
    }

    fn team(&self, id: TeamId) -> EngineResult<Option<Team>> {
        Ok(self.tables.teams.get(&id).cloned())
    }

    fn teams_led_by(&self, leader: ParticipantId) -> EngineResult<Vec<Team>> {
        Ok(self
            .tables
            .teams
            .values()
            .filter(|t| t.leader == leader)
            .cloned()
            .collect())
    }

    fn put_team(&mut self, team: Team) -> EngineResult<()> {
        if let Some(existing) = self.tables.teams.get(&team.id) {
            if existing.is_sealed() {
                return Err(EngineError::Integrity(format!("{} is sealed", team.id)));
            }
        }
        self.put(table::teams, team.id, team);
        Ok(())
    }

    fn append_promotion(&mut self, record: PromotionRecord) -> EngineResult<()> {
        let key = self.tables.promotions.len() as u64 + 1;
        self.put(table::promotions, key, record);
        Ok(())
    }

    fn promotions_for(&self, participant: ParticipantId) -> EngineResult<Vec<PromotionRecord>> {
        Ok(self
            .tables
            .promotions
            .values()
            .filter(|p| p.participant == participant)
            .cloned()
            .collect())
    }

    fn open_pool(&self) -> EngineResult<Option<Pool>> {
        Ok(self.tables.pools.values().find(|p| p.is_open()).cloned())
    }

    fn pool(&self, id: PoolId) -> EngineResult<Option<Pool>> {
        Ok(self.tables.pools.get(&id).cloned())
    }

    fn put_pool(&mut self, pool: Pool) -> EngineResult<()> {
        if let Some(existing) = self.tables.pools.get(&pool.id) {
            if !existing.is_open() {
                return Err(EngineError::PoolAlreadyDistributed(pool.id));
            }
        }
        if pool.is_open() {
            if let Some(other) = self.tables.pools.values().find(|p| p.is_open() && p.id != pool.id) {
                return Err(EngineError::Integrity(format!("{} is already open", other.id)));
            }
        }
        self.put(table::pools, pool.id, pool);
        Ok(())
    }

    fn withdrawal(&self, id: WithdrawalId) -> EngineResult<Option<Withdrawal>> {
        Ok(self.tables.withdrawals.get(&id).cloned())
    }

    fn put_withdrawal(&mut self, withdrawal: Withdrawal) -> EngineResult<()> {
        self.put(table::withdrawals, withdrawal.id, withdrawal);
        Ok(())
    }

    fn withdrawals_for(&self, participant: ParticipantId) -> EngineResult<Vec<Withdrawal>> {
        Ok(self
            .tables
            .withdrawals
            .values()
            .filter(|w| w.participant == participant)
            .cloned()
            .collect())
    }

    fn append_job_run(&mut self, run: JobRun) -> EngineResult<()> {
        let key = self.tables.job_runs.len() as u64 + 1;
        self.put(table::job_runs, key, run);
        Ok(())
    }

    fn job_runs(&self) -> EngineResult<Vec<JobRun>> {
        Ok(self.tables.job_runs.values().cloned().collect())
    }

    fn append_health_report(&mut self, report: HealthReport) -> EngineResult<()> {
        let key = self.tables.health_reports.len() as u64 + 1;
        self.put(table::health_reports, key, report);
        Ok(())
    }

    fn latest_health_report(&self) -> EngineResult<Option<HealthReport>> {
        Ok(self.tables.health_reports.values().next_back().cloned())
    }
}

/// Mutex-guarded in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic inside a unit of work has already been rolled back by
        // MemoryTx::drop, so the tables behind a poisoned lock are consistent.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Export every table
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_tables(&self.lock())
    }

    /// Rebuild a store, including its secondary indexes, from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> EngineResult<Self> {
        let tables = snapshot.into_tables()?;
        Ok(Self { tables: Mutex::new(tables) })
    }

    /// Write a JSON snapshot to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        let content = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize snapshot: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| EngineError::Storage(format!("Failed to write snapshot {}: {}", path.display(), e)))?;
        info!(path = %path.display(), participants = snapshot.participants.len(), "snapshot saved");
        Ok(())
    }

    /// Load a JSON snapshot, or start empty if `path` does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no snapshot found, starting with an empty store");
            return Ok(Self::new());
        }
        let content = std::fs::read(path)
            .map_err(|e| EngineError::Storage(format!("Failed to read snapshot {}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_slice(&content)
            .map_err(|e| EngineError::Storage(format!("Failed to parse snapshot {}: {}", path.display(), e)))?;
        Self::from_snapshot(snapshot)
    }
}

impl Store for MemoryStore {
    fn transact<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> EngineResult<T>,
    {
        let mut guard = self.lock();
        let mut tx = MemoryTx::new(&mut guard);
        let outcome = work(&mut tx);
        if outcome.is_ok() {
            tx.commit();
        }
        outcome
    }
}

impl Tables {
    pub(crate) fn stored_purchases(&self) -> Vec<StoredPurchase> {
        self.purchases
            .values()
            .filter_map(|purchase| {
                self.distributions.get(&purchase.id).map(|result| StoredPurchase {
                    purchase: purchase.clone(),
                    result: result.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tierflow_types::{EntryType, ROOT_SLOT};

    fn node(participant: u64, parent: Option<u64>, slot: u8) -> TreeNode {
        TreeNode {
            participant: ParticipantId(participant),
            parent: parent.map(ParticipantId),
            slot,
            placed_at: Utc::now(),
        }
    }

    fn entry(seq: u64, participant: Option<u64>, amount: i64, ref_key: &str) -> LedgerEntry {
        LedgerEntry {
            seq,
            participant: participant.map(ParticipantId),
            amount,
            entry_type: EntryType::LevelCommission,
            ref_key: ref_key.to_string(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();
        store
            .transact(|uow| uow.put_participant(Participant::new(ParticipantId(1), None, Utc::now())))
            .unwrap();

        let found = store.transact(|uow| uow.participant(ParticipantId(1))).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_error_rolls_back_every_write() {
        let store = MemoryStore::new();
        let result: EngineResult<()> = store.transact(|uow| {
            uow.put_participant(Participant::new(ParticipantId(1), None, Utc::now()))?;
            uow.claim_slot(node(1, None, ROOT_SLOT))?;
            uow.append_entry(entry(1, Some(1), 50, "a"))?;
            uow.next_id(Sequence::Pool)?;
            Err(EngineError::Storage("boom".into()))
        });
        assert!(result.is_err());

        store
            .transact(|uow| {
                assert!(uow.participant(ParticipantId(1))?.is_none());
                assert!(uow.tree_node(ParticipantId(1))?.is_none());
                assert!(uow.entry_by_ref("a")?.is_none());
                assert_eq!(uow.next_id(Sequence::Pool)?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_panic_rolls_back_and_store_stays_usable() {
        let store = MemoryStore::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.transact(|uow| -> EngineResult<()> {
                uow.put_participant(Participant::new(ParticipantId(9), None, Utc::now()))?;
                panic!("crash mid unit of work");
            });
        }));
        assert!(outcome.is_err());

        let found = store.transact(|uow| uow.participant(ParticipantId(9))).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_claim_slot_is_compare_and_set() {
        let store = MemoryStore::new();
        store
            .transact(|uow| {
                uow.claim_slot(node(1, None, ROOT_SLOT))?;
                uow.claim_slot(node(2, Some(1), 1))
            })
            .unwrap();

        let conflict = store.transact(|uow| uow.claim_slot(node(3, Some(1), 1)));
        assert_eq!(conflict, Err(EngineError::PlacementConflict { parent: ParticipantId(1), slot: 1 }));

        let again = store.transact(|uow| uow.claim_slot(node(2, Some(1), 2)));
        assert_eq!(again, Err(EngineError::AlreadyPlaced(ParticipantId(2))));
    }

    #[test]
    fn test_duplicate_ref_key_rejected() {
        let store = MemoryStore::new();
        store.transact(|uow| uow.append_entry(entry(1, None, 10, "O1:company"))).unwrap();
        let duplicate = store.transact(|uow| uow.append_entry(entry(2, None, 10, "O1:company")));
        assert_eq!(duplicate, Err(EngineError::DuplicateRefKey("O1:company".into())));
    }

    #[test]
    fn test_children_in_slot_order() {
        let store = MemoryStore::new();
        let children = store
            .transact(|uow| {
                uow.claim_slot(node(1, None, ROOT_SLOT))?;
                uow.claim_slot(node(4, Some(1), 3))?;
                uow.claim_slot(node(2, Some(1), 1))?;
                uow.children(ParticipantId(1))
            })
            .unwrap();
        let slots: Vec<u8> = children.iter().map(|c| c.slot).collect();
        assert_eq!(slots, vec![1, 3]);
    }
}
