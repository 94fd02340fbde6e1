//! Tracing subscriber setup for the binary
//!
//! Library crates only emit events. The binary installs one subscriber:
//! stderr in pretty or JSON form, plus an optional daily-rotated file in
//! the state directory.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "vault-backup.log";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directive; `RUST_LOG` applies when unset
    pub level: Option<String>,
    pub format: LogFormat,
    /// Directory for the rotated log file
    pub file_dir: Option<PathBuf>,
}

/// Filter from an explicit directive, else `RUST_LOG`, else `default`
pub fn env_filter(level: Option<&str>, default: &str) -> Result<EnvFilter> {
    match level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("Invalid log level '{directive}'")),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))),
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(options: &LogOptions, default_level: &str) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(options.level.as_deref(), default_level)?;

    let stderr_layer = match options.format {
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let (file_layer, guard) = match &options.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
