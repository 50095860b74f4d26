//! Logging infrastructure for geotrack hosts.
//!
//! Provides structured logging with file output and console output:
//! - Writes to `<directory>/<file>` (cleared on session start)
//! - Also prints to stdout
//! - Configurable via the `RUST_LOG` environment variable, falling back to
//!   the configured level

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Initialize logging from settings.
///
/// Creates the log directory if needed, clears the previous log file, and
/// installs a global subscriber writing to both the file and stdout.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be cleared.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    let path = prepare_log_file(&settings.directory, &settings.file)?;

    let file_appender = tracing_appender::rolling::never(&settings.directory, &settings.file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    // Single-line entries: estimates are logged often
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!(path = %path.display(), "Logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}

/// Create `directory` and truncate `directory/file`, returning the file path.
fn prepare_log_file(directory: &Path, file: &str) -> Result<PathBuf, io::Error> {
    fs::create_dir_all(directory)?;
    let path = directory.join(file);
    fs::write(&path, "")?;
    Ok(path)
}

/// `RUST_LOG` if set, otherwise `default_level` (or `info` if that is invalid).
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
