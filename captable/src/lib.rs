//! Cap table facade: one controller over the snapshot ledger, round
//! closing, pro-rata entitlements, and exit waterfalls.

mod controller;
mod error;

pub use controller::CapTableController;
pub use error::{ControllerError, Result};

pub use core_types::{AppConfig, CompanyId, EntitlementId, ExitEventId, RoundId, StakeholderId};
pub use ledger::{CapTableSnapshot, SnapshotExport};
pub use pro_rata::{EntitlementStatus, ProRataEntitlement};
pub use round_engine::{ClosedRound, FinalTerms, Round, RoundClosing, RoundStatus};
pub use waterfall::{ExitDistribution, WaterfallResult};
