//! Structured logging setup.
//!
//! The routing core only emits `tracing` events; installing a subscriber is
//! left to the application. [`init_logging_with_config`] installs a
//! reasonable default:
//!
//! | Variable                       | Default | Meaning                          |
//! |--------------------------------|---------|----------------------------------|
//! | `ROUTELINE_LOG_LEVEL`          | `info`  | trace/debug/info/warn/error      |
//! | `ROUTELINE_LOG_FORMAT`         | `json`  | `json` or `pretty`               |
//! | `ROUTELINE_LOG_TARGET_FILTER`  | unset   | extra comma-separated directives |
//! | `ROUTELINE_LOG_ASYNC`          | `false` | buffered writer on a thread      |
//! | `ROUTELINE_LOG_INCLUDE_LOCATION` | `false` | file and line in each event    |
//!
//! `RUST_LOG` overrides the level when set.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Write through a background thread
    pub async_logging: bool,
    /// Extra filter directives, comma-separated (`routeline::router=debug`)
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: false,
            target_filter: None,
            include_location: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("ROUTELINE_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: env::var("ROUTELINE_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            async_logging: env_flag("ROUTELINE_LOG_ASYNC", defaults.async_logging),
            target_filter: env::var("ROUTELINE_LOG_TARGET_FILTER")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            include_location: env_flag("ROUTELINE_LOG_INCLUDE_LOCATION", defaults.include_location),
        }
    }

    /// Pretty, synchronous, debug level with locations
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    /// Level name, falling back to `info` for anything unrecognised
    #[must_use]
    pub fn level(&self) -> Level {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Filter built from `RUST_LOG` (or the level) plus `target_filter`.
    /// Invalid directives are skipped.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(target_filter) = &self.target_filter {
            for directive in target_filter.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {}", directive),
                }
            }
        }
        filter
    }
}

/// Install the global subscriber described by `config`.
///
/// With `async_logging` the returned guard flushes buffered events when
/// dropped; keep it alive for the lifetime of the application.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

/// [`init_logging_with_config`] with [`LogConfig::from_env`]
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    init_logging_with_config(&LogConfig::from_env())
}
