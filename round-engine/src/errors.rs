use core_types::{money::MoneyError, RoundId};
use ledger::LedgerError;
use thiserror::Error;

use crate::round::RoundStatus;

pub type Result<T> = std::result::Result<T, RoundError>;

#[derive(Debug, Error)]
pub enum RoundError {
    #[error("round {round_id} is not ready to close: {reason}")]
    RoundNotReady { round_id: RoundId, reason: String },
    #[error("round {round_id} cannot move from {from:?} to {to:?}")]
    InvalidStatus {
        round_id: RoundId,
        from: RoundStatus,
        to: RoundStatus,
    },
    #[error("round {round_id} rejected investment: {reason}")]
    InvalidInvestment { round_id: RoundId, reason: String },
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<MoneyError> for RoundError {
    fn from(value: MoneyError) -> Self {
        RoundError::Ledger(value.into())
    }
}
