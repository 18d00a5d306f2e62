// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared identifiers, share class terms, positions, fixed-point helpers,
//! configuration, and status reporting for the cap table workspace.

pub mod config;
pub mod money;
pub mod status;
pub mod types;
pub mod uid;

pub use config::{AppConfig, LedgerSettings, ProRataConfig, WaterfallConfig};
pub use money::{MoneyError, ShareCount};
pub use types::{
    AntiDilution, CompanyId, EntitlementId, ExitEventId, NewPosition, Participation, Position,
    PositionId, RoundId, ShareClass, ShareClassId, ShareClassKind, StakeholderId,
};
