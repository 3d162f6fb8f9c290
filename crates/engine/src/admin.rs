//! Administrator commands.

use serde::{Deserialize, Serialize};

use tierflow_types::{
    HealthReport, Installment, InstallmentKey, InstallmentState, KycStatus, Participant, ParticipantId,
    PoolDistribution, PoolId, PromotionRecord, Tier, Withdrawal, WithdrawalId,
};

/// Actions an administrator can trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AdminCommand {
    DistributePool { pool: PoolId },
    ApproveWithdrawal { withdrawal: WithdrawalId },
    RejectWithdrawal { withdrawal: WithdrawalId, reason: String },
    /// Raise a participant's tier; lowering is rejected
    OverrideTier { participant: ParticipantId, tier: Tier, reason: Option<String> },
    /// Set an installment to any state
    OverrideInstallment { installment: InstallmentKey, state: InstallmentState, note: Option<String> },
    SetKycStatus { participant: ParticipantId, status: KycStatus },
    ForceReconciliation,
}

/// What a command produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AdminOutcome {
    PoolDistributed(PoolDistribution),
    WithdrawalDecided(Withdrawal),
    TierRaised(PromotionRecord),
    InstallmentOverridden(Installment),
    KycUpdated(Participant),
    Reconciled(HealthReport),
}
