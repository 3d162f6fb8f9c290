//! # Identifiers
//!
//! Numeric newtypes for entities whose ids are issued by collaborators or by
//! store sequences, so one kind of id cannot be passed where another is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor currency units. Signed so that debits and corrections share the
/// ledger representation with credits.
pub type Amount = i64;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Participant identity, issued by the storefront account system
    ParticipantId,
    "P"
);
numeric_id!(
    /// Paid purchase identity, issued by checkout
    PurchaseId,
    "O"
);
numeric_id!(
    /// Pool sequence number
    PoolId,
    "pool"
);
numeric_id!(
    /// Team sequence number
    TeamId,
    "team"
);
numeric_id!(
    /// Withdrawal request sequence number
    WithdrawalId,
    "wd"
);

/// Store sequences that hand out ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sequence {
    Pool,
    Team,
    Withdrawal,
    LedgerEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(ParticipantId(42).to_string(), "P42");
        assert_eq!(PurchaseId(9).to_string(), "O9");
        assert_eq!(PoolId(1).to_string(), "pool1");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&ParticipantId(5)).unwrap();
        assert_eq!(json, "5");
    }
}
