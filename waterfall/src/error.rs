use core_types::money::MoneyError;
use ledger::LedgerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WaterfallError>;

#[derive(Debug, Error)]
pub enum WaterfallError {
    #[error("invalid exit input: {reason}")]
    InvalidExitInput { reason: String },
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] MoneyError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl WaterfallError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        WaterfallError::InvalidExitInput {
            reason: reason.into(),
        }
    }
}
