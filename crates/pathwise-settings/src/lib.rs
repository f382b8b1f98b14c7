//! # pathwise-settings
//!
//! Layered configuration for the Pathwise persistence kernel.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PathwiseSettings::default()`]
//! 2. **Settings file**: `~/.pathwise/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PATHWISE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, read_settings_file,
    settings_path,
};
pub use types::{
    IN_MEMORY_PATH, Isolation, LogFormat, LogSettings, PathwiseSettings, StoreSettings,
};
