use std::{
    fs,
    path::{Path, PathBuf},
};

use core_types::{LedgerSettings, ShareCount};

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub state_dir: Option<PathBuf>,
    pub max_total_shares: ShareCount,
}

impl LedgerConfig {
    pub fn in_memory() -> Self {
        Self {
            state_dir: None,
            max_total_shares: ShareCount::MAX,
        }
    }

    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: Some(state_dir.into()),
            ..Self::in_memory()
        }
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    pub fn journal_dir(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("snapshots"))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(dir) = self.journal_dir() {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl From<&LedgerSettings> for LedgerConfig {
    fn from(settings: &LedgerSettings) -> Self {
        Self {
            state_dir: settings.state_dir.clone(),
            max_total_shares: settings.max_total_shares,
        }
    }
}
