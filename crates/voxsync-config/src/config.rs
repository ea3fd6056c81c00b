//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Optimistic write bookkeeping.
    pub reconcile: ReconcileConfig,
    /// Background worker settings.
    pub worker: WorkerConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Grace period and sweep cadence for unacknowledged local writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Sweeps a pending write survives before it is rolled back.
    pub grace_ticks: u32,
    /// Milliseconds between ledger sweeps.
    pub sweep_interval_ms: u64,
}

/// Background worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// OS thread name given to the worker.
    pub thread_name: String,
    /// How long blocking init/deinit wait for `started`/`stopped`.
    pub lifecycle_timeout_ms: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g. "debug", "info,voxsync_client=trace").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_ticks: 5,
            sweep_interval_ms: 250,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "voxel-worker".to_string(),
            lifecycle_timeout_ms: 5_000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl ReconcileConfig {
    /// Sweep period as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl WorkerConfig {
    /// Lifecycle wait budget as a [`Duration`].
    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }
}

// --- Validation ---

impl Config {
    /// Rejects values the reconciliation loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.grace_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "reconcile.grace_ticks",
                reason: "must be at least 1",
            });
        }
        if self.reconcile.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "reconcile.sweep_interval_ms",
                reason: "must be non-zero",
            });
        }
        if self.worker.thread_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "worker.thread_name",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

/// File name of the persisted config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

impl Config {
    /// Path of the config file inside `config_dir`.
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load config from the given directory, writing the defaults there first
    /// if no config file exists yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        match Self::read_file(&path) {
            Err(ConfigError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let defaults = Self::default();
                defaults.save(config_dir)?;
                log::info!("Wrote default settings to {}", path.display());
                Ok(defaults)
            }
            Ok(config) => {
                log::info!("Read settings from {}", path.display());
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Write this config to `config_dir`, creating the directory if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let rendered = self.to_ron()?;
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        std::fs::write(Self::path_in(config_dir), rendered).map_err(ConfigError::WriteError)
    }

    /// Re-read the file in `config_dir`. Yields the new config only when it
    /// differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read_file(&Self::path_in(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Settings changed on disk");
        Ok(Some(fresh))
    }

    /// Parse and validate a single config file.
    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Self = ron::from_str(&text).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn to_ron(&self) -> Result<String, ConfigError> {
        // Sections are two levels deep; keep leaf tuples inline.
        let style = ron::ser::PrettyConfig::new().depth_limit(2);
        ron::ser::to_string_pretty(self, style).map_err(ConfigError::SerializeError)
    }
}
