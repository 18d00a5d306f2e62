// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::money::ShareCount;

/// Workspace configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub pro_rata: ProRataConfig,
    #[serde(default)]
    pub waterfall: WaterfallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Snapshot journal directory; history stays in memory when unset.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default = "default_max_total_shares")]
    pub max_total_shares: ShareCount,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            state_dir: None,
            max_total_shares: default_max_total_shares(),
        }
    }
}

fn default_max_total_shares() -> ShareCount {
    ShareCount::MAX
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProRataConfig {
    #[serde(default = "default_exercise_window_days")]
    pub exercise_window_days: u32,
}

impl ProRataConfig {
    pub fn exercise_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.exercise_window_days))
    }
}

impl Default for ProRataConfig {
    fn default() -> Self {
        Self {
            exercise_window_days: default_exercise_window_days(),
        }
    }
}

fn default_exercise_window_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallConfig {
    /// Minor currency unit scale; 2 pays to the cent.
    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,
    /// Upper bound on top-down passes over the preferred classes when
    /// settling conversion choices.
    #[serde(default = "default_max_election_depth")]
    pub max_election_depth: usize,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            currency_scale: default_currency_scale(),
            max_election_depth: default_max_election_depth(),
        }
    }
}

fn default_currency_scale() -> u32 {
    2
}

fn default_max_election_depth() -> usize {
    16
}

impl AppConfig {
    /// Reads `captable.toml` (optional) and `CAPTABLE__SECTION__KEY`
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("captable").required(false))
            .add_source(Environment::with_prefix("CAPTABLE").separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.max_total_shares == 0 {
            return Err(ConfigError::Message(
                "ledger.max_total_shares must be positive".to_string(),
            ));
        }
        if self.pro_rata.exercise_window_days == 0 {
            return Err(ConfigError::Message(
                "pro_rata.exercise_window_days must be positive".to_string(),
            ));
        }
        if self.waterfall.currency_scale > 8 {
            return Err(ConfigError::Message(
                "waterfall.currency_scale must be at most 8".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.pro_rata.exercise_window_days, 30);
        assert_eq!(config.waterfall.currency_scale, 2);
        assert_eq!(config.waterfall.max_election_depth, 16);
        assert_eq!(config.ledger.max_total_shares, ShareCount::MAX);
        assert!(config.ledger.state_dir.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [ledger]
            state_dir = "/tmp/captable"
            max_total_shares = 1000000

            [pro_rata]
            exercise_window_days = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.max_total_shares, 1_000_000);
        assert_eq!(
            config.ledger.state_dir.as_deref(),
            Some(std::path::Path::new("/tmp/captable"))
        );
        assert_eq!(config.pro_rata.exercise_window(), chrono::Duration::days(14));
        assert_eq!(config.waterfall.currency_scale, 2);
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = AppConfig::from_toml("[pro_rata]\nexercise_window_days = 0\n").unwrap_err();
        assert!(err.to_string().contains("exercise_window_days"));
    }
}
