//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathwiseSettings {
    /// Store handle and connection pool settings.
    pub store: StoreSettings,
    /// Logging configuration.
    pub logging: LogSettings,
}

impl PathwiseSettings {
    /// Reject values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()
    }
}

/// Transaction isolation requested by callers of the transaction runner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// Read committed.
    #[default]
    ReadCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable.
    Serializable,
}

/// Store handle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file path, or [`IN_MEMORY_PATH`].
    pub database_path: String,
    /// Maximum pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Maximum wait for a pooled connection in milliseconds.
    pub connection_timeout_ms: u64,
    /// Page cache size in KiB.
    pub cache_size_kib: i64,
    /// Default deadline applied to database contexts built from the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_timeout_ms: Option<u64>,
    /// Isolation used when a caller does not pick one.
    pub default_isolation: Isolation,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: "pathwise.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
            connection_timeout_ms: 5_000,
            cache_size_kib: 8192,
            statement_timeout_ms: None,
            default_isolation: Isolation::ReadCommitted,
        }
    }
}

impl StoreSettings {
    /// Settings for a private in-memory database, used by tests and tools.
    pub fn in_memory() -> Self {
        Self {
            database_path: IN_MEMORY_PATH.to_string(),
            pool_size: 4,
            ..Self::default()
        }
    }

    /// Whether the settings select an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_path == IN_MEMORY_PATH
    }

    /// Reject values the pool cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "store.databasePath cannot be empty".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be at least 1".to_string(),
            ));
        }
        if self.connection_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "store.connectionTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `("pathwise_store", "debug")`.
    pub module_levels: Vec<(String, String)>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            module_levels: Vec::new(),
        }
    }
}
