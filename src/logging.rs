use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding a tracing filter, e.g. "taskdeck=debug".
pub const LOG_ENV: &str = "TASKDECK_LOG";

const LOG_FILE: &str = "taskdeck.log";

/// Directory log files are written to.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("taskdeck"))
}

/// Send tracing output to a daily log file under `dir`.
///
/// Stdout is left for command output. The returned guard flushes pending
/// lines when dropped, so hold it for the life of the process.
pub fn init_logging(dir: &Path, level: Option<&str>) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
    .map_err(|e| eyre!("Invalid log filter: {}", e))?;

  let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!(dir = %dir.display(), "logging initialized");
  Ok(guard)
}
