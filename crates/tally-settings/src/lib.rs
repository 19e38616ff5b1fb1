//! # tally-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **User file**: `~/.tally/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TALLY_*` overrides (highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{ensure_settings_file, load_settings, load_settings_from_path, settings_path, tally_home};
pub use types::{DatabaseSettings, LoggingSettings, ServerSettings, TallySettings};
