//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PathwiseSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `PATHWISE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, PathwiseSettings};

/// Resolve the default settings file path (`~/.pathwise/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pathwise").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PathwiseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or invalid final values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<PathwiseSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Load defaults merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<PathwiseSettings> {
    let defaults = serde_json::to_value(PathwiseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in effect.
pub fn apply_env_overrides<F>(settings: &mut PathwiseSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("PATHWISE_DB_PATH") {
        settings.store.database_path = v;
    }
    if let Some(v) = env.u64_in("PATHWISE_DB_POOL_SIZE", 1, 256) {
        settings.store.pool_size = u32::try_from(v).unwrap_or(settings.store.pool_size);
    }
    if let Some(v) = env.u64_in("PATHWISE_DB_BUSY_TIMEOUT_MS", 0, 600_000) {
        settings.store.busy_timeout_ms = u32::try_from(v).unwrap_or(settings.store.busy_timeout_ms);
    }
    if let Some(v) = env.u64_in("PATHWISE_DB_CONNECTION_TIMEOUT_MS", 1, 600_000) {
        settings.store.connection_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("PATHWISE_DB_STATEMENT_TIMEOUT_MS", 1, 3_600_000) {
        settings.store.statement_timeout_ms = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PATHWISE_LOG_LEVEL") {
        match parse_level(&v) {
            Some(level) => settings.logging.level = level.to_string(),
            None => tracing::warn!(key = "PATHWISE_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
    if let Some(v) = env.string("PATHWISE_LOG_FORMAT") {
        match v.to_lowercase().as_str() {
            "json" => settings.logging.format = LogFormat::Json,
            "pretty" | "text" => settings.logging.format = LogFormat::Pretty,
            _ => tracing::warn!(key = "PATHWISE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Normalize a log level name.
pub fn parse_level(val: &str) -> Option<&'static str> {
    match val.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}
