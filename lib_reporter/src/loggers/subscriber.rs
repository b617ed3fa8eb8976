use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// How the process-wide subscriber should look.
#[derive(Debug, Clone)]
pub struct LoggingSetup {
    /// File name prefix, usually the binary name.
    pub app_name: String,
    /// Directory for log files; created if missing.
    pub log_dir: PathBuf,
    /// Filter directive (`info`, `lib_reporter=debug,warn`, ...). `RUST_LOG` wins when set.
    pub log_level: String,
    /// Emit JSON lines on the console instead of human-readable text.
    pub json: bool,
    /// How many older log files survive a restart.
    pub keep_files: usize,
}

/// Installs a console layer plus a file layer writing to
/// `<log_dir>/<app_name>_<timestamp>.log`.
///
/// Older files of the same app beyond `keep_files` are deleted first. Keep the
/// returned guard alive for the life of the process or buffered lines are lost.
pub fn init_tracing(setup: &LoggingSetup) -> Result<WorkerGuard> {
    if !setup.log_dir.exists() {
        fs::create_dir_all(&setup.log_dir)
            .with_context(|| format!("creating log dir {}", setup.log_dir.display()))?;
    }
    cleanup_old_logs(&setup.log_dir, &setup.app_name, setup.keep_files)?;

    let file_name = format!(
        "{}_{}.log",
        setup.app_name,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let appender = tracing_appender::rolling::never(&setup.log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&setup.log_level))
        .context("invalid log level directive")?;

    let console = if setup.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };
    let file = fmt::layer().with_ansi(false).with_writer(file_writer).boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}

/// Deletes `<app_name>_*.log` files in `log_dir`, keeping the `keep` newest.
///
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, app_name: &str, keep: usize) -> Result<usize> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&prefix) && name.ends_with(".log")
        })
        .collect();

    // Timestamped names sort chronologically; newest first.
    entries.sort_by_key(|e| std::cmp::Reverse(e.file_name()));

    let mut removed = 0;
    for entry in entries.iter().skip(keep) {
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", entry.path(), e),
        }
    }
    Ok(removed)
}
