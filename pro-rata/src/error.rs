use chrono::{DateTime, Utc};
use core_types::EntitlementId;
use ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::entitlement::EntitlementStatus;

pub type Result<T> = std::result::Result<T, ProRataError>;

#[derive(Debug, Error)]
pub enum ProRataError {
    #[error("entitlement {entitlement_id} is {status:?}; cannot {operation}")]
    InvalidStatus {
        entitlement_id: EntitlementId,
        status: EntitlementStatus,
        operation: &'static str,
    },
    #[error("entitlement {entitlement_id} expired at {deadline}")]
    OpportunityExpired {
        entitlement_id: EntitlementId,
        deadline: DateTime<Utc>,
    },
    #[error("entitlement {entitlement_id}: {requested} exceeds remaining allocation {remaining}")]
    ExceedsAllocation {
        entitlement_id: EntitlementId,
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("entitlement {entitlement_id} is already exercised")]
    AlreadyExercised { entitlement_id: EntitlementId },
    #[error("entitlement {entitlement_id} is already declined")]
    AlreadyDeclined { entitlement_id: EntitlementId },
    #[error("entitlement {entitlement_id}: exercise amount {amount} must be positive")]
    InvalidAmount {
        entitlement_id: EntitlementId,
        amount: Decimal,
    },
    #[error("entitlement {entitlement_id} is not tracked")]
    UnknownEntitlement { entitlement_id: EntitlementId },
    #[error("entitlement {entitlement_id} is already tracked")]
    DuplicateEntitlement { entitlement_id: EntitlementId },
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
