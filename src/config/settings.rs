// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::provider::ProviderEntry;
use crate::refine::RefineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Model providers in priority order; the first entry is used.
    pub providers: Vec<ProviderEntry>,

    /// Refinement loop tunables.
    pub refine: RefineSettings,

    /// Path to the artifact history database.
    pub artifacts_db: PathBuf,
}

impl Config {
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers,
            refine: RefineSettings::default(),
            artifacts_db: default_artifacts_db(),
        }
    }

    /// The provider the refiner should use.
    pub fn active_provider(&self) -> Option<&ProviderEntry> {
        self.providers.first()
    }
}

/// `[refine]` section of the config file. Durations are stored in
/// milliseconds so the TOML stays flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_threshold: Option<f32>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            quality_threshold: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl RefineSettings {
    pub fn to_refine_config(&self) -> RefineConfig {
        RefineConfig {
            max_iterations: self.max_iterations,
            quality_threshold: self.quality_threshold,
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_settle_delay_ms() -> u64 {
    600
}

fn default_capture_timeout_ms() -> u64 {
    10_000
}

pub(super) fn default_artifacts_db() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".restyle")
        .join("artifacts.db")
}
