//! Settings storage
//!
//! Manages persistence of session settings: the default model configuration
//! and the liveness watchdog policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::models::DEFAULT_MODEL;
use crate::storage::{get_data_dir, StorageError};
use crate::types::ModelConfig;

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Model configuration used when the UI does not override it
    pub default_model: ModelConfig,
    /// Seconds between liveness checks
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    /// Missed heartbeats tolerated before the engine is reported dead
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Undelivered deltas an engine may buffer ahead of the consumer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_max_missed_heartbeats() -> u32 {
    2
}

fn default_stream_buffer() -> usize {
    64
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_model: ModelConfig::default(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl SessionSettings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.default_model.validate();
        if self.default_model.model.trim().is_empty() {
            self.default_model.model = DEFAULT_MODEL.to_string();
        }

        self.watchdog_interval_secs = self.watchdog_interval_secs.clamp(1, 300);
        self.stream_buffer = self.stream_buffer.max(1);
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("session.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> SessionSettings {
    match get_settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            SessionSettings::default()
        }
    }
}

/// Load and validate settings from `path`; a missing file yields defaults
pub fn load_settings_from(path: &Path) -> Result<SessionSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(SessionSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: SessionSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &SessionSettings) -> Result<(), StorageError> {
    save_settings_to(&get_settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &SessionSettings) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {:?}", path);
    Ok(())
}
