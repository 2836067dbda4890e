//! Logging Module
//!
//! Structured logging with a rolling file for diagnostics.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::storage::app_data_dir;

const LOG_FILE: &str = "pawhub-connect.log";
const ENV_CONSOLE: &str = "PAWHUB_LOG_CONSOLE";

/// Install the global subscriber.
///
/// Logs go to a daily file under `log_dir` (default: the app data dir);
/// a console layer is added in debug builds or when `PAWHUB_LOG_CONSOLE`
/// is set. Calling twice keeps the first subscriber.
pub fn init(log_dir: Option<PathBuf>) {
    let log_dir = log_dir.unwrap_or_else(default_log_directory);
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_appender);

    let console_layer = console_enabled().then(|| fmt::layer().with_target(true).compact());

    let subscriber = tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(console_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("debug,hyper=warn,reqwest=warn")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn")
        }
    })
}

fn console_enabled() -> bool {
    cfg!(debug_assertions) || std::env::var_os(ENV_CONSOLE).is_some()
}

fn default_log_directory() -> PathBuf {
    app_data_dir().join("logs")
}
