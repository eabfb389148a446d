//! Logging for the `rotascope` binary
//!
//! Log lines go to stderr so stdout carries only command output
//! (`rotascope format` prints the rotation there). With
//! [`LoggingSettings::file`] on, a size-rotated `rotascope.log` is written
//! too, by default under the platform config dir.
//!
//! `RUST_LOG` wins over everything else. Otherwise `DEBUG_LOGGING=1` or
//! `debug = true` in the `[logging]` config section raises the rotascope
//! crates to debug.

use std::io;
use std::path::{Path, PathBuf};

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use rotascope_core::config::LoggingSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const APP_NAME: &str = "rotascope";
const LOG_FILE: &str = "rotascope.log";
const DEBUG_DIRECTIVE: &str = "info,rotascope_core=debug,rotascope_cli=debug";

/// Install the global subscriber.
///
/// Returns the file writer's guard, which must live until exit or buffered
/// lines are lost. `None` means stderr only: file output is off, or the log
/// directory or file could not be created.
pub fn init(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let debug_logging = settings.debug || std::env::var("DEBUG_LOGGING").is_ok();

    if !settings.file {
        init_stderr_only(debug_logging);
        return None;
    }
    let Some(log_dir) = log_dir(settings) else {
        init_stderr_only(debug_logging);
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        // Subscriber not installed yet
        eprintln!("Failed to create log directory {log_dir:?}: {e}, logging to stderr only");
        init_stderr_only(debug_logging);
        return None;
    }

    let log_path = log_dir.join(LOG_FILE);
    let file_appender = match file_appender(&log_path, settings) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Failed to create log file at {log_path:?}: {e}");
            init_stderr_only(debug_logging);
            return None;
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer())
        .with(filter(debug_logging))
        .init();

    tracing::debug!(log_file = ?log_path, debug_logging, "Logging initialized");
    Some(guard)
}

fn init_stderr_only(debug_logging: bool) {
    tracing_subscriber::registry()
        .with(stderr_layer())
        .with(filter(debug_logging))
        .init();

    tracing::debug!(debug_logging, "Logging initialized (stderr only)");
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
}

fn log_dir(settings: &LoggingSettings) -> Option<PathBuf> {
    settings
        .directory
        .clone()
        .or_else(|| dirs::config_dir().map(|config| config.join(APP_NAME)))
}

fn file_appender(path: &Path, settings: &LoggingSettings) -> io::Result<BasicRollingFileAppender> {
    let max_bytes = settings.max_file_mb.max(1) * 1024 * 1024;
    BasicRollingFileAppender::new(
        path,
        RollingConditionBasic::new().max_size(max_bytes),
        settings.keep_files,
    )
}

fn filter_directive(debug_logging: bool) -> &'static str {
    if debug_logging { DEBUG_DIRECTIVE } else { "info" }
}

fn filter(debug_logging: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(debug_logging)))
}
