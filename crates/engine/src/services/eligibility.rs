//! Monthly eligibility and KYC status.

use tracing::{debug, info};

use tierflow_types::math::safe_add;
use tierflow_types::{Amount, EngineResult, KycStatus, Participant, ParticipantId, YearMonth};

use crate::store::{require_participant, UnitOfWork};

/// Sum of a participant's purchase amounts within one calendar month
pub fn monthly_total(uow: &dyn UnitOfWork, participant: ParticipantId, period: YearMonth) -> EngineResult<Amount> {
    uow.purchases_of(participant)?
        .iter()
        .filter(|p| period.contains(p.paid_at))
        .try_fold(0, |sum, p| safe_add(sum, p.amount))
}

/// Recompute and store the monthly eligibility flag for `period`
pub fn refresh(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    period: YearMonth,
    min_monthly_purchase: Amount,
) -> EngineResult<bool> {
    let mut record = require_participant(uow, participant)?;
    let total = monthly_total(uow, participant, period)?;
    let eligible = record.kyc_status == KycStatus::Verified && total >= min_monthly_purchase;

    record.monthly_eligible = eligible;
    record.eligibility_period = Some(period);
    uow.put_participant(record)?;

    debug!(%participant, %period, total, eligible, "monthly eligibility refreshed");
    Ok(eligible)
}

/// Record a KYC review outcome. Losing verification clears the monthly flag.
pub fn set_kyc_status(
    uow: &mut dyn UnitOfWork,
    participant: ParticipantId,
    status: KycStatus,
) -> EngineResult<Participant> {
    let mut record = require_participant(uow, participant)?;
    let previous = record.kyc_status;
    record.kyc_status = status;
    if status != KycStatus::Verified {
        record.monthly_eligible = false;
    }
    uow.put_participant(record.clone())?;

    info!(%participant, ?previous, ?status, "kyc status updated");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use chrono::{TimeZone, Utc};
    use tierflow_types::{
        DistributionResult, Purchase, PurchaseClass, PurchaseId,
    };

    fn record_purchase(uow: &mut dyn UnitOfWork, id: u64, amount: Amount, month: u32) -> EngineResult<()> {
        let paid_at = Utc.with_ymd_and_hms(2026, month, 10, 12, 0, 0).unwrap();
        let purchase = Purchase {
            id: PurchaseId(id),
            participant: ParticipantId(1),
            amount,
            class: PurchaseClass::Repurchase,
            paid_at,
        };
        let result = DistributionResult {
            purchase: purchase.id,
            participant: purchase.participant,
            class: purchase.class,
            amount,
            company_share: 0,
            user_pool: 0,
            level_credits: Vec::new(),
            unused_returned: 0,
            self_income_reserve: 0,
            pool_contribution: 0,
            pool: None,
            placement: None,
            referral_code: None,
            sealed_team: None,
            promotions: Vec::new(),
            replayed: false,
        };
        uow.insert_purchase(purchase, result)
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .transact(|uow| {
                uow.put_participant(Participant::new(ParticipantId(1), None, Utc::now()))?;
                record_purchase(uow, 1, 3_000, 3)?;
                record_purchase(uow, 2, 3_000, 3)?;
                record_purchase(uow, 3, 9_000, 4)
            })
            .unwrap();
        store
    }

    #[test]
    fn test_requires_kyc_and_minimum() {
        let store = store();
        let march = YearMonth { year: 2026, month: 3 };

        assert!(!store.transact(|uow| refresh(uow, ParticipantId(1), march, 5_000)).unwrap());

        store.transact(|uow| set_kyc_status(uow, ParticipantId(1), KycStatus::Verified)).unwrap();
        assert!(store.transact(|uow| refresh(uow, ParticipantId(1), march, 5_000)).unwrap());
        assert!(!store.transact(|uow| refresh(uow, ParticipantId(1), march, 6_001)).unwrap());
    }

    #[test]
    fn test_only_counts_the_period() {
        let store = store();
        let april = YearMonth { year: 2026, month: 4 };
        let total = store.transact(|uow| monthly_total(uow, ParticipantId(1), april)).unwrap();
        assert_eq!(total, 9_000);
    }

    #[test]
    fn test_revoked_kyc_clears_flag() {
        let store = store();
        let march = YearMonth { year: 2026, month: 3 };
        store.transact(|uow| set_kyc_status(uow, ParticipantId(1), KycStatus::Verified)).unwrap();
        store.transact(|uow| refresh(uow, ParticipantId(1), march, 5_000)).unwrap();

        let record = store.transact(|uow| set_kyc_status(uow, ParticipantId(1), KycStatus::Rejected)).unwrap();
        assert!(!record.monthly_eligible);
    }
}
