//! Withdrawal requests and their administrator decisions.
//!
//! A request only reserves funds logically; the wallet is debited when an
//! administrator approves it.

use chrono::{DateTime, Utc};
use tracing::info;

use tierflow_types::math::{safe_add, safe_sub};
use tierflow_types::{
    Amount, EngineError, EngineResult, EntryType, KycStatus, ParticipantId, RefKey, Sequence, Withdrawal,
    WithdrawalId, WithdrawalState,
};

use crate::services::ledger::{credit, Credit};
use crate::store::{require_participant, UnitOfWork};

pub fn request(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    amount: Amount,
    min_withdrawal: Amount,
    now: DateTime<Utc>,
) -> EngineResult<Withdrawal> {
    let record = require_participant(uow, participant)?;
    if amount < min_withdrawal {
        return Err(EngineError::invalid("amount", amount, &format!("at least {}", min_withdrawal)));
    }
    if record.kyc_status != KycStatus::Verified {
        return Err(EngineError::KycRequired(participant));
    }

    let pending = uow
        .withdrawals_for(participant)?
        .iter()
        .filter(|w| w.is_pending())
        .try_fold(0, |sum, w| safe_add(sum, w.amount))?;
    let available = safe_sub(record.wallet_balance, pending)?;
    if amount > available {
        return Err(EngineError::InsufficientBalance { participant, required: amount, available });
    }

    let withdrawal = Withdrawal {
        id: WithdrawalId(uow.next_id(Sequence::Withdrawal)?),
        participant,
        amount,
        state: WithdrawalState::Requested,
        requested_at: now,
        decided_at: None,
        reason: None,
    };
    uow.put_withdrawal(withdrawal.clone())?;

    info!(withdrawal = %withdrawal.id, %participant, amount, "withdrawal requested");
    Ok(withdrawal)
}

/// Approve a pending request and debit the wallet
pub fn approve(uow: &mut dyn UnitOfWork, id: WithdrawalId, now: DateTime<Utc>) -> EngineResult<Withdrawal> {
    let mut withdrawal = require_pending(uow, id, WithdrawalState::Approved)?;
    credit(
        uow,
        Credit::to(withdrawal.participant, -withdrawal.amount, EntryType::Withdrawal, RefKey::withdrawal(id))
            .described(format!("withdrawal {}", id)),
        now,
    )?;
    withdrawal.state = WithdrawalState::Approved;
    withdrawal.decided_at = Some(now);
    uow.put_withdrawal(withdrawal.clone())?;

    info!(withdrawal = %id, participant = %withdrawal.participant, amount = withdrawal.amount, "withdrawal approved");
    Ok(withdrawal)
}

pub fn reject(
    uow: &mut dyn UnitOfWork,
    id: WithdrawalId,
    reason: String,
    now: DateTime<Utc>,
) -> EngineResult<Withdrawal> {
    let mut withdrawal = require_pending(uow, id, WithdrawalState::Rejected)?;
    withdrawal.state = WithdrawalState::Rejected;
    withdrawal.decided_at = Some(now);
    withdrawal.reason = Some(reason);
    uow.put_withdrawal(withdrawal.clone())?;

    info!(withdrawal = %id, participant = %withdrawal.participant, "withdrawal rejected");
    Ok(withdrawal)
}

fn require_pending(uow: &dyn UnitOfWork, id: WithdrawalId, next: WithdrawalState) -> EngineResult<Withdrawal> {
    let withdrawal = uow.withdrawal(id)?.ok_or(EngineError::UnknownWithdrawal(id))?;
    if !withdrawal.is_pending() {
        return Err(EngineError::transition(format!("withdrawal {}", id), withdrawal.state, next));
    }
    Ok(withdrawal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::eligibility::set_kyc_status;
    use crate::store::{MemoryStore, Store};
    use tierflow_types::Participant;

    fn funded(balance: Amount, kyc: KycStatus) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .transact(|uow| {
                uow.put_participant(Participant::new(ParticipantId(1), None, Utc::now()))?;
                set_kyc_status(uow, ParticipantId(1), kyc)?;
                credit(
                    uow,
                    Credit::to(ParticipantId(1), balance, EntryType::LevelCommission, "O1:L1".into()),
                    Utc::now(),
                )
                .map(|_| ())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_approve_debits_wallet() {
        let store = funded(5_000, KycStatus::Verified);
        let requested = store.transact(|uow| request(uow, ParticipantId(1), 2_000, 1_000, Utc::now())).unwrap();
        let approved = store.transact(|uow| approve(uow, requested.id, Utc::now())).unwrap();

        assert_eq!(approved.state, WithdrawalState::Approved);
        let balance = store.transact(|uow| Ok(require_participant(uow, ParticipantId(1))?.wallet_balance)).unwrap();
        assert_eq!(balance, 3_000);
    }

    #[test]
    fn test_pending_requests_reserve_balance() {
        let store = funded(5_000, KycStatus::Verified);
        store.transact(|uow| request(uow, ParticipantId(1), 4_000, 1_000, Utc::now())).unwrap();
        let second = store.transact(|uow| request(uow, ParticipantId(1), 2_000, 1_000, Utc::now()));
        assert!(matches!(second, Err(EngineError::InsufficientBalance { available: 1_000, .. })));
    }

    #[test]
    fn test_kyc_and_minimum_enforced() {
        let store = funded(5_000, KycStatus::Pending);
        let unverified = store.transact(|uow| request(uow, ParticipantId(1), 2_000, 1_000, Utc::now()));
        assert_eq!(unverified, Err(EngineError::KycRequired(ParticipantId(1))));

        let verified = funded(5_000, KycStatus::Verified);
        let small = verified.transact(|uow| request(uow, ParticipantId(1), 10, 1_000, Utc::now()));
        assert!(matches!(small, Err(EngineError::Validation { .. })));
    }

    #[test]
    fn test_rejected_request_cannot_be_approved() {
        let store = funded(5_000, KycStatus::Verified);
        let requested = store.transact(|uow| request(uow, ParticipantId(1), 2_000, 1_000, Utc::now())).unwrap();
        store.transact(|uow| reject(uow, requested.id, "bank details mismatch".into(), Utc::now())).unwrap();

        let late = store.transact(|uow| approve(uow, requested.id, Utc::now()));
        assert!(matches!(late, Err(EngineError::InvalidTransition { .. })));
        assert!(store.transact(|uow| uow.entry_by_ref("wd1:debit")).unwrap().is_none());
    }
}
