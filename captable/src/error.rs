use core_types::{ExitEventId, RoundId};
use ledger::LedgerError;
use pro_rata::ProRataError;
use round_engine::RoundError;
use thiserror::Error;
use waterfall::WaterfallError;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Round(#[from] RoundError),
    #[error(transparent)]
    ProRata(#[from] ProRataError),
    #[error(transparent)]
    Waterfall(#[from] WaterfallError),
    #[error("round {round_id} is not tracked")]
    UnknownRound { round_id: RoundId },
    #[error("round {round_id} is already tracked")]
    RoundExists { round_id: RoundId },
    #[error("exit event {exit_event_id} was already computed with different inputs")]
    ExitEventConflict { exit_event_id: ExitEventId },
}

impl ControllerError {
    /// True for optimistic-concurrency rejections the caller should retry
    /// against the latest snapshot.
    pub fn is_stale(&self) -> bool {
        match self {
            ControllerError::Ledger(err) => err.is_stale(),
            ControllerError::Round(RoundError::Ledger(err)) => err.is_stale(),
            _ => false,
        }
    }
}
