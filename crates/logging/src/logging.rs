use crate::{AppError, ResultExt};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[path = "config.rs"]
mod config;

pub const DEFAULT_KEEP_DAYS: u64 = 7;
const LOG_FILE_PREFIX: &str = "mediashare";
const LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone)]
pub struct LoggingGuard {
    log_dir: PathBuf,
    level: String,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn level(&self) -> &str {
        &self.level
    }
}

fn worker_guard_slot() -> &'static Mutex<Option<WorkerGuard>> {
    static SLOT: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

pub fn resolve_log_level() -> String {
    config::resolve_log_level()
}

/// Installs the global subscriber: JSON lines into a daily file under `<data_dir>/logs`,
/// plus a compact console layer in debug builds.
///
/// Calling it again after a subscriber is installed only refreshes the log directory.
pub fn init_logging(app_data_dir: &Path) -> Result<LoggingGuard, AppError> {
    let log_dir = app_data_dir.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))
        .with_code("log_dir_create_failed", "Could not create the log directory")
        .with_ctx("logDir", log_dir.display().to_string())?;
    cleanup_expired_logs(&log_dir, DEFAULT_KEEP_DAYS)?;

    let level = resolve_log_level();
    if tracing::dispatcher::has_been_set() {
        return Ok(LoggingGuard { log_dir, level });
    }

    let file_appender = RollingBuilder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&log_dir)
        .with_context(|| format!("create log appender in {}", log_dir.display()))
        .with_code("log_appender_create_failed", "Could not open the log file")
        .with_ctx("logDir", log_dir.display().to_string())?;
    let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);

    if let Ok(mut slot) = worker_guard_slot().lock() {
        *slot = Some(worker_guard);
    }

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_current_span(false)
        .with_span_list(false);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level.clone()))
        .with(file_layer);
    #[cfg(debug_assertions)]
    let subscriber = subscriber.with(
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_target(true)
            .with_writer(std::io::stderr),
    );

    subscriber
        .try_init()
        .with_context(|| format!("install subscriber at level {level}"))
        .with_code("log_subscriber_init_failed", "Could not start logging")
        .with_ctx("logLevel", level.clone())?;

    tracing::info!(
        event = "logging_initialized",
        level = level.as_str(),
        log_dir = %log_dir.display()
    );
    Ok(LoggingGuard { log_dir, level })
}

/// Flushes buffered file output. The guard slot is emptied, so later events only reach
/// the console layer.
pub fn shutdown_logging() {
    if let Ok(mut slot) = worker_guard_slot().lock() {
        slot.take();
    }
}

pub fn cleanup_expired_logs(log_dir: &Path, keep_days: u64) -> Result<(), AppError> {
    let keep_duration = Duration::from_secs(keep_days.saturating_mul(24 * 60 * 60));
    cleanup_expired_logs_with_duration(log_dir, keep_duration, SystemTime::now())?;
    Ok(())
}

pub(crate) fn cleanup_expired_logs_with_duration(
    log_dir: &Path,
    keep_duration: Duration,
    now: SystemTime,
) -> Result<usize, AppError> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0usize;
    for entry in walkdir::WalkDir::new(log_dir).min_depth(1).max_depth(1) {
        let entry = entry
            .with_context(|| format!("read log dir {}", log_dir.display()))
            .with_code("log_cleanup_read_dir_failed", "Could not read the log directory")
            .with_ctx("logDir", log_dir.display().to_string())?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let modified_at = entry
            .metadata()
            .map_err(anyhow::Error::from)
            .and_then(|metadata| metadata.modified().map_err(anyhow::Error::from))
            .with_context(|| format!("read modified time of {}", path.display()))
            .with_code("log_cleanup_metadata_failed", "Could not inspect a log file")
            .with_ctx("logPath", path.display().to_string())?;

        let elapsed = now.duration_since(modified_at).unwrap_or_default();
        if elapsed <= keep_duration {
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(error) => {
                tracing::warn!(
                    event = "log_cleanup_remove_failed",
                    log_path = %path.display(),
                    error = error.to_string()
                );
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
#[path = "../tests/logging/logging_tests.rs"]
mod tests;
