//! # Structured Logging
//!
//! Pipeline events go through `tracing`:
//!
//! - `debug!` on buffer transitions and engine dispatches
//! - `info!` on start, stop and reconfiguration
//! - `warn!` on overruns and point-cloud truncation
//! - `error!` on hardware faults
//!
//! [`init_logging`] installs the global subscriber. `RUST_LOG` takes over
//! from the configured level unless `filter` is set.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmw_core::observe::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! init_logging(&LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Json,
//!     ..Default::default()
//! });
//!
//! tracing::info!(frame = 12, points = 9, "frame complete");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Crates whose events the default directives enable.
const TARGETS: [&str; 2] = ["mmw_core", "mmw_accel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, coloured
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// The `logging:` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Emit `file:line` with each event
    pub source_location: bool,
    /// Emit the thread name (the runner thread is `mmw-pipeline`)
    pub thread_names: bool,
    /// Emit span open/close events
    pub span_events: bool,
    /// Explicit directives, e.g. `"mmw_core::pipeline=debug,mmw_accel=warn"`
    pub filter: Option<String>,
}

impl LogConfig {
    /// Debug level with source locations, for bench bring-up.
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            thread_names: true,
            ..Default::default()
        }
    }

    /// JSON events for a log collector.
    pub fn collector() -> Self {
        Self {
            format: LogFormat::Json,
            thread_names: true,
            ..Default::default()
        }
    }

    /// Hardware faults only.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            ..Default::default()
        }
    }

    /// Filter directives: `filter` if set, otherwise `level` for both
    /// pipeline crates.
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.level))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let configured = || {
            EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
        };
        if self.filter.is_some() {
            return configured();
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured())
    }
}

/// Install the global subscriber.
///
/// Only the first call takes effect.
pub fn init_logging(config: &LogConfig) {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_names(config.thread_names)
        .with_span_events(spans);
    let registry = Registry::default().with(config.env_filter());

    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(layer.json())),
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(layer.pretty())),
        LogFormat::Compact => tracing::subscriber::set_global_default(registry.with(layer.compact())),
    };
    if installed.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
    }

    #[test]
    fn test_directives_cover_both_crates() {
        let config = LogConfig {
            level: LogLevel::Trace,
            ..Default::default()
        };
        assert_eq!(config.directives(), "mmw_core=trace,mmw_accel=trace");

        let custom = LogConfig {
            filter: Some("mmw_core::pipeline=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.directives(), "mmw_core::pipeline=debug");
    }

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert!(LogConfig::verbose().source_location);
        assert_eq!(LogConfig::collector().format, LogFormat::Json);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_logging(&LogConfig::quiet());
        init_logging(&LogConfig::verbose());
    }

    #[test]
    fn test_section_from_yaml() {
        let config: LogConfig = serde_yaml::from_str("format: json\nlevel: warn\n").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.filter.is_none());
        assert!(!config.thread_names);
    }
}
