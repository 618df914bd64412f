use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::project_dirs;

/// Directory holding the daily-rotated `iamdb.log` files.
pub fn log_dir() -> Option<PathBuf> {
  project_dirs().map(|dirs| dirs.data_local_dir().join("logs"))
}

/// `IAMDB_LOG`, then `RUST_LOG`, then `info`.
fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("IAMDB_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Route tracing output to a file; the terminal belongs to the TUI.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(dir: Option<&Path>) -> Option<WorkerGuard> {
  let dir = dir.map(Path::to_path_buf).or_else(log_dir)?;
  std::fs::create_dir_all(&dir).ok()?;
  let appender = tracing_appender::rolling::daily(&dir, "iamdb.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::registry()
    .with(env_filter())
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
    .try_init()
    .ok()?;
  Some(guard)
}
