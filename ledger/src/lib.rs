//! Versioned cap table ledger.
//!
//! The crate exposes:
//! - [`CapTableLedger`]: per-company snapshot history with optimistic version checks.
//! - [`CapTableSnapshot`] / [`SnapshotDraft`]: immutable versions and the working copy
//!   that builds the next one.
//! - [`ShareClassRegistry`]: share class terms in force at a version.
//! - [`SnapshotJournal`]: on-disk history used by [`CapTableLedger::bootstrap`].
//! - [`SnapshotExport`]: flattened JSON/CSV view of a snapshot.

pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod registry;
pub mod snapshot;
pub mod storage;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use export::{PositionRow, SnapshotExport, EXPORT_SCHEMA, EXPORT_SCHEMA_VERSION};
pub use ledger::{CapTableLedger, LedgerStats};
pub use registry::ShareClassRegistry;
pub use snapshot::{cost_basis_for, CapTableSnapshot, SnapshotDraft};
pub use storage::SnapshotJournal;
