//! Structured logging setup.
//!
//! The terminal belongs to the render engine while monitoring, so log lines
//! go to a daily rolling file instead of stdout/stderr. Verbosity follows
//! `RUST_LOG` and falls back to the `[log] filter` config value.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;

/// File name prefix for rolled log files.
const LOG_FILE_PREFIX: &str = "whalewatch.log";

/// Initializes the global tracing subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes buffered
/// log lines.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a subscriber is
/// already installed.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
    let directory = config.directory();
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log dir {}", directory.display()))?;

    let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
