//! # Logging Setup
//!
//! Console plus daily-rolling JSON file output through `tracing`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// # Setup Logging
///
/// Installs the global `tracing` subscriber:
/// - the filter comes from `RUST_LOG` if set, otherwise from `log_level`;
/// - console output is human-readable with ANSI colors;
/// - file output is JSON, written to a daily rotating file in `log_dir`
///   named after `file_prefix`.
///
/// The returned guard flushes the file writer when dropped. Keep it alive
/// for the whole process.
pub fn setup_logging(log_dir: &Path, log_level: &str, file_prefix: &str) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = rolling::daily(log_dir, format!("{}.log", file_prefix));
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}
