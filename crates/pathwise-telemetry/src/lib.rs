//! # pathwise-telemetry
//!
//! Installs the global `tracing` subscriber from [`LogSettings`].
//!
//! `RUST_LOG` wins over the configured level when set. Output is either
//! human-readable lines or one JSON object per event.

#![deny(unsafe_code)]

use pathwise_settings::{LogFormat, LogSettings};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directives did not parse.
    #[error("invalid log filter `{filter}`: {message}")]
    InvalidFilter {
        /// Directive string that was rejected.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber was already installed.
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Build the filter directive string from settings, e.g. `info,pathwise_store=debug`.
pub fn filter_directives(settings: &LogSettings) -> String {
    let mut filter = settings.level.trim().to_lowercase();
    if filter.is_empty() {
        filter.push_str("info");
    }
    for (module, level) in &settings.module_levels {
        filter.push(',');
        filter.push_str(module);
        filter.push('=');
        filter.push_str(&level.to_lowercase());
    }
    filter
}

fn build_filter(settings: &LogSettings) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = filter_directives(settings);
    EnvFilter::try_new(&directives).map_err(|e| TelemetryError::InvalidFilter {
        filter: directives.clone(),
        message: e.to_string(),
    })
}

/// Initialize logging. Call once at startup.
pub fn init_logging(settings: &LogSettings) -> Result<(), TelemetryError> {
    let env_filter = build_filter(settings)?;

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(level = %settings.level, format = ?settings.format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_level() {
        let settings = LogSettings::default();
        assert_eq!(filter_directives(&settings), "info");
    }

    #[test]
    fn directives_with_module_overrides() {
        let settings = LogSettings {
            level: "WARN".to_string(),
            module_levels: vec![
                ("pathwise_store".to_string(), "DEBUG".to_string()),
                ("r2d2".to_string(), "error".to_string()),
            ],
            ..LogSettings::default()
        };
        assert_eq!(
            filter_directives(&settings),
            "warn,pathwise_store=debug,r2d2=error"
        );
    }

    #[test]
    fn empty_level_falls_back_to_info() {
        let settings = LogSettings {
            level: "  ".to_string(),
            ..LogSettings::default()
        };
        assert_eq!(filter_directives(&settings), "info");
    }

    #[test]
    fn directives_parse_as_env_filter() {
        let settings = LogSettings {
            level: "debug".to_string(),
            module_levels: vec![("pathwise_store::engine".to_string(), "trace".to_string())],
            ..LogSettings::default()
        };
        assert!(EnvFilter::try_new(filter_directives(&settings)).is_ok());
    }
}
