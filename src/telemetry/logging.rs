//! `tracing` subscriber setup for binaries embedding the queue.
//!
//! The queue itself only emits events; installing a subscriber is the
//! application's call. These helpers cover the two common setups: stderr
//! only, or stderr plus a daily-rotated log file.

use crate::error::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` wins over `default_filter` when set.
fn env_filter(default_filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| Error::logging(format!("invalid filter {:?}: {}", default_filter, e)))
}

/// Install a global stderr subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter = env_filter(default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .map_err(|e| Error::logging(e.to_string()))
}

/// Install a global subscriber that writes to stderr and to
/// `<dir>/<file_prefix>.<date>`, rotated at midnight.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process.
pub fn init_logging_with_file(
    default_filter: &str,
    dir: impl AsRef<Path>,
    file_prefix: &str,
) -> Result<WorkerGuard> {
    let filter = env_filter(default_filter)?;

    let appender = tracing_appender::rolling::daily(dir.as_ref(), file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .map_err(|e| Error::logging(e.to_string()))?;

    Ok(guard)
}
