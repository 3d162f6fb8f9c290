//! Ledger and wallet primitive.
//!
//! Every money movement goes through [`credit`]: one append-only ledger entry
//! plus, for participant entries, the matching wallet change, both inside the
//! caller's unit of work. A ref key that already exists short-circuits to
//! [`CreditOutcome::Duplicate`] so retried triggers never double-credit.

use chrono::{DateTime, Utc};
use tracing::debug;

use tierflow_types::{
    Amount, CreditOutcome, EngineError, EngineResult, EntryType, LedgerEntry, ParticipantId, Sequence,
};

use crate::store::{require_participant, UnitOfWork};

/// One requested ledger movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    /// `None` = company ledger
    pub participant: Option<ParticipantId>,
    pub amount: Amount,
    pub entry_type: EntryType,
    pub ref_key: String,
    pub description: String,
}

impl Credit {
    pub fn company(amount: Amount, entry_type: EntryType, ref_key: String) -> Self {
        Self { participant: None, amount, entry_type, ref_key, description: String::new() }
    }

    pub fn to(participant: ParticipantId, amount: Amount, entry_type: EntryType, ref_key: String) -> Self {
        Self { participant: Some(participant), amount, entry_type, ref_key, description: String::new() }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Append a ledger entry and move the wallet by the same amount.
///
/// Debits use a negative amount; a debit that would take a wallet below
/// zero fails with `InsufficientBalance`. Correction entries are written to
/// the ledger only.
pub fn credit(uow: &mut dyn UnitOfWork, credit: Credit, now: DateTime<Utc>) -> EngineResult<CreditOutcome> {
    if credit.ref_key.is_empty() {
        return Err(EngineError::invalid("ref_key", "", "non-empty idempotency key"));
    }
    if let Some(existing) = uow.entry_by_ref(&credit.ref_key)? {
        debug!(ref_key = %credit.ref_key, "ledger ref key already applied");
        return Ok(CreditOutcome::Duplicate(existing));
    }

    if let Some(id) = credit.participant {
        let mut participant = require_participant(uow, id)?;
        if credit.entry_type.moves_wallet() {
            let balance = participant
                .wallet_balance
                .checked_add(credit.amount)
                .ok_or(EngineError::Arithmetic("wallet_balance"))?;
            if credit.amount < 0 && balance < 0 {
                return Err(EngineError::InsufficientBalance {
                    participant: id,
                    required: -credit.amount,
                    available: participant.wallet_balance,
                });
            }
            participant.wallet_balance = balance;
            uow.put_participant(participant)?;
        }
    }

    let seq = uow.next_id(Sequence::LedgerEntry)?;
    let entry = LedgerEntry {
        seq,
        participant: credit.participant,
        amount: credit.amount,
        entry_type: credit.entry_type,
        ref_key: credit.ref_key,
        description: credit.description,
        created_at: now,
    };
    uow.append_entry(entry.clone())?;

    debug!(
        seq,
        participant = ?entry.participant,
        amount = entry.amount,
        entry_type = ?entry.entry_type,
        ref_key = %entry.ref_key,
        "ledger entry appended"
    );
    Ok(CreditOutcome::Applied(entry))
}

/// Sum of a participant's ledger entries
pub fn ledger_sum(uow: &dyn UnitOfWork, participant: ParticipantId) -> EngineResult<Amount> {
    uow.entries_for(Some(participant))?
        .iter()
        .try_fold(0i64, |sum, entry| sum.checked_add(entry.amount))
        .ok_or(EngineError::Arithmetic("ledger_sum"))
}

/// Net of the company ledger
pub fn company_balance(uow: &dyn UnitOfWork) -> EngineResult<Amount> {
    uow.entries_for(None)?
        .iter()
        .try_fold(0i64, |sum, entry| sum.checked_add(entry.amount))
        .ok_or(EngineError::Arithmetic("company_balance"))
}
