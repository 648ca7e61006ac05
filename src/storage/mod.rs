//! Persistent storage
//!
//! Settings persistence and the static model catalog.

pub mod models;
pub mod settings;

use std::path::PathBuf;

use directories::ProjectDirs;
use thiserror::Error;

/// Errors from reading or writing local data
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not determine the data directory")]
    NoDataDir,
}

/// Platform data directory for the application
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("com", "LocaLM", "LocaLM")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}
