use core_types::{
    money::MoneyError, types::ShareClassError, CompanyId, ShareClassId, StakeholderId,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },
    #[error("stale snapshot for {company_id}: expected version {expected}, latest is {actual}")]
    StaleSnapshot {
        company_id: CompanyId,
        expected: u64,
        actual: u64,
    },
    #[error("company {company_id} is not tracked")]
    UnknownCompany { company_id: CompanyId },
    #[error("company {company_id} is already tracked")]
    CompanyExists { company_id: CompanyId },
    #[error("company {company_id} has no snapshot version {version}")]
    UnknownVersion { company_id: CompanyId, version: u64 },
    #[error("share class {share_class_id} is not registered")]
    UnknownShareClass { share_class_id: ShareClassId },
    #[error("stakeholder {stakeholder_id} holds no {share_class_id} shares")]
    NoHoldings {
        stakeholder_id: StakeholderId,
        share_class_id: ShareClassId,
    },
    #[error("share class terms: {0}")]
    InvalidTerms(#[from] ShareClassError),
    #[error("journal encoding error: {0}")]
    Journal(#[from] serde_json::Error),
    #[error("export error: {0}")]
    Export(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn invariant(reason: impl Into<String>) -> Self {
        LedgerError::InvariantViolation {
            reason: reason.into(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, LedgerError::StaleSnapshot { .. })
    }
}

impl From<MoneyError> for LedgerError {
    fn from(value: MoneyError) -> Self {
        LedgerError::invariant(value.to_string())
    }
}
