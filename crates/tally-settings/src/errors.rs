//! Settings error types.

use thiserror::Error;

/// Failure loading or writing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings file I/O: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON or does not match the settings tree.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
