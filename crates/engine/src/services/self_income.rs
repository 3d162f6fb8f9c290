//! Self-income scheduler.
//!
//! A first purchase reserves part of its user pool for the buyer, paid out in
//! four weekly installments. Each installment pays only once the buyer has
//! [`SELF_INCOME_MIN_DIRECT_CHILDREN`] placement-direct children with a first
//! purchase; until then it waits in `PendingEligibility`.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use tierflow_types::{
    installment_amounts, installment_due_at, Amount, EngineError, EngineResult, EntryType, Installment,
    InstallmentKey, InstallmentState, ParticipantId, PurchaseId, RefKey, INSTALLMENT_COUNT,
    SELF_INCOME_MIN_DIRECT_CHILDREN,
};

use crate::services::ledger::{credit, Credit};
use crate::store::UnitOfWork;

/// What a settlement attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Paid,
    Pending,
    /// The installment was already in a settled state
    AlreadySettled,
}

/// Create the four installments of a first-purchase reserve.
///
/// Installments that already exist for the purchase are kept as they are.
pub fn reserve(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    purchase: PurchaseId,
    total: Amount,
    now: DateTime<Utc>,
) -> EngineResult<Vec<Installment>> {
    let amounts = installment_amounts(total)?;
    let mut schedule = Vec::with_capacity(INSTALLMENT_COUNT as usize);

    for (sequence, amount) in (1..=INSTALLMENT_COUNT).zip(amounts) {
        let key = InstallmentKey { purchase, sequence };
        if let Some(existing) = uow.installment(key)? {
            schedule.push(existing);
            continue;
        }
        let installment = Installment {
            key,
            participant,
            amount,
            due_at: installment_due_at(now, sequence),
            state: InstallmentState::Scheduled,
            retry_count: 0,
            note: None,
            last_error: None,
            settled_at: None,
        };
        uow.put_installment(installment.clone())?;
        schedule.push(installment);
    }

    debug!(%participant, %purchase, total, "self-income reserve scheduled");
    Ok(schedule)
}

/// Number of placement-direct children who have made a first purchase
pub fn qualified_children(uow: &dyn UnitOfWork, participant: ParticipantId) -> EngineResult<usize> {
    let mut qualified = 0;
    for child in uow.children(participant)? {
        if uow.participant(child.participant)?.is_some_and(|p| p.has_first_purchase()) {
            qualified += 1;
        }
    }
    Ok(qualified)
}

pub fn is_eligible(uow: &dyn UnitOfWork, participant: ParticipantId) -> EngineResult<bool> {
    Ok(qualified_children(uow, participant)? >= SELF_INCOME_MIN_DIRECT_CHILDREN)
}

/// Installments a settlement run should look at: scheduled ones that are
/// due, plus every pending one.
pub fn due(uow: &dyn UnitOfWork, now: DateTime<Utc>) -> EngineResult<Vec<InstallmentKey>> {
    let mut keys: Vec<InstallmentKey> = uow
        .installments_in_state(InstallmentState::Scheduled)?
        .into_iter()
        .filter(|i| i.due_at <= now)
        .chain(uow.installments_in_state(InstallmentState::PendingEligibility)?)
        .map(|i| i.key)
        .collect();
    keys.sort();
    Ok(keys)
}

/// Settle one installment: pay it if the owner is eligible, otherwise park
/// it in `PendingEligibility` with a note.
pub fn settle(uow: &mut dyn UnitOfWork, key: InstallmentKey, now: DateTime<Utc>) -> EngineResult<Settlement> {
    let mut installment = require_installment(uow, key)?;
    if installment.state.is_settled() {
        return Ok(Settlement::AlreadySettled);
    }

    let qualified = qualified_children(uow, installment.participant)?;
    if qualified < SELF_INCOME_MIN_DIRECT_CHILDREN {
        let note = format!(
            "awaiting {} placement-direct children with a first purchase, have {}",
            SELF_INCOME_MIN_DIRECT_CHILDREN, qualified
        );
        installment.advance(InstallmentState::PendingEligibility, Some(note))?;
        uow.put_installment(installment)?;
        return Ok(Settlement::Pending);
    }

    pay(uow, &mut installment, now)?;
    uow.put_installment(installment)?;
    Ok(Settlement::Paid)
}

fn pay(uow: &mut dyn UnitOfWork, installment: &mut Installment, now: DateTime<Utc>) -> EngineResult<()> {
    let key = installment.key;
    if installment.amount > 0 {
        credit(
            uow,
            Credit::to(
                installment.participant,
                installment.amount,
                EntryType::SelfIncomePayout,
                RefKey::installment(key.purchase, key.sequence),
            )
            .described(format!("self-income installment {} of {}", key.sequence, INSTALLMENT_COUNT)),
            now,
        )?;
    }
    installment.advance(InstallmentState::Paid, None)?;
    installment.settled_at = Some(now);
    info!(
        participant = %installment.participant,
        purchase = %key.purchase,
        sequence = key.sequence,
        amount = installment.amount,
        "self-income installment paid"
    );
    Ok(())
}

/// Pay every pending installment of `participant` that is due, if they are
/// now eligible. Called whenever their placement-direct children change.
pub fn release_pending_for(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    now: DateTime<Utc>,
) -> EngineResult<Vec<InstallmentKey>> {
    let pending: Vec<Installment> = uow
        .installments_for(participant)?
        .into_iter()
        .filter(|i| i.state == InstallmentState::PendingEligibility && i.due_at <= now)
        .collect();
    if pending.is_empty() || !is_eligible(uow, participant)? {
        return Ok(Vec::new());
    }

    let mut released = Vec::with_capacity(pending.len());
    for mut installment in pending {
        pay(uow, &mut installment, now)?;
        released.push(installment.key);
        uow.put_installment(installment)?;
    }
    info!(%participant, released = released.len(), "pending self-income released");
    Ok(released)
}

/// Record a failed settlement attempt. Non-retryable errors, and retryable
/// ones past `max_retries`, mark the installment permanently failed.
pub fn record_failure(
    uow: &mut dyn UnitOfWork,
    key: InstallmentKey,
    failure: &EngineError,
    max_retries: u32,
    now: DateTime<Utc>,
) -> EngineResult<InstallmentState> {
    let mut installment = require_installment(uow, key)?;
    if installment.state.is_settled() {
        return Ok(installment.state);
    }

    installment.retry_count = installment.retry_count.saturating_add(1);
    installment.last_error = Some(failure.to_string());

    if !failure.is_retryable() || installment.retry_count >= max_retries {
        installment.advance(
            InstallmentState::PermanentlyFailed,
            Some(format!("gave up after {} attempt(s); needs administrator action", installment.retry_count)),
        )?;
        installment.settled_at = Some(now);
        error!(
            purchase = %key.purchase,
            sequence = key.sequence,
            retries = installment.retry_count,
            error = %failure,
            "installment permanently failed"
        );
    } else {
        warn!(
            purchase = %key.purchase,
            sequence = key.sequence,
            retries = installment.retry_count,
            error = %failure,
            "installment settlement failed, will retry"
        );
    }

    let state = installment.state;
    uow.put_installment(installment)?;
    Ok(state)
}

/// Administrator override: set any state. Moving to `Paid` credits the
/// installment if it was never credited.
pub fn override_state(
    uow: &mut dyn UnitOfWork,
    key: InstallmentKey,
    state: InstallmentState,
    note: Option<String>,
    now: DateTime<Utc>,
) -> EngineResult<Installment> {
    let mut installment = require_installment(uow, key)?;
    let from = installment.state;

    if state == InstallmentState::Paid && from != InstallmentState::Paid {
        // Reset so the forward-only transition inside pay() is accepted.
        installment.state = InstallmentState::Scheduled;
        pay(uow, &mut installment, now)?;
    } else {
        installment.state = state;
        installment.settled_at = state.is_settled().then_some(now);
    }
    if state == InstallmentState::Scheduled {
        installment.retry_count = 0;
        installment.last_error = None;
    }
    installment.note = Some(note.unwrap_or_else(|| format!("administrator override from {:?}", from)));

    warn!(purchase = %key.purchase, sequence = key.sequence, ?from, to = ?state, "installment state overridden");
    uow.put_installment(installment.clone())?;
    Ok(installment)
}

fn require_installment(uow: &dyn UnitOfWork, key: InstallmentKey) -> EngineResult<Installment> {
    uow.installment(key)?.ok_or(EngineError::UnknownInstallment { purchase: key.purchase, sequence: key.sequence })
}
