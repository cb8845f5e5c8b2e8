//! Configuration model.
//!
//! Loaded from `config.toml` by `shifter_infrastructure::ConfigService`.
//! Every section and field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::energy::{clamp_intensity, EnergyType};
use crate::progression::ProgressionTable;

pub const DEFAULT_PROFILE_TABLE: &str = "profiles";

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local backend, for development and tests.
    #[default]
    Memory,
    /// Hosted auth/rows/objects platform reached over HTTP.
    Rest,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Base URL of the hosted platform (required for `rest`).
    pub url: Option<String>,
    /// Public project API key (required for `rest`).
    pub api_key: Option<String>,
    pub profile_table: String,
    /// Where to keep the signed-in session between runs.
    pub session_file: Option<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: None,
            api_key: None,
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            session_file: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EnergySettings {
    pub default_type: EnergyType,
    pub default_intensity: f64,
}

impl Default for EnergySettings {
    fn default() -> Self {
        Self {
            default_type: EnergyType::default(),
            default_intensity: 0.5,
        }
    }
}

impl EnergySettings {
    pub fn initial_intensity(&self) -> f64 {
        clamp_intensity(self.default_intensity)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ProgressionSettings {
    /// Custom tier table; the built-in ladder is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<ProgressionTable>,
}

impl ProgressionSettings {
    pub fn table(&self) -> ProgressionTable {
        self.tiers.clone().unwrap_or_default()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ShifterConfig {
    pub backend: BackendSettings,
    pub energy: EnergySettings,
    pub progression: ProgressionSettings,
    pub logging: LoggingSettings,
}
