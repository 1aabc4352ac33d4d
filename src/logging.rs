//! Structured logging and tracing for Solarizer
//!
//! Console output (text or JSON) plus an optional daily rolling log file.
//! Components log through [`StructuredLogger`] so every line carries the
//! emitting component.

mod level;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

use crate::config::LoggingConfig;
use crate::error::{Result, SolarizerError};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = init_subscriber(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(SolarizerError::config(err.clone()));
    }
    Ok(())
}

fn init_subscriber(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = build_env_filter(level);

    let console_layer = config.console_output.then(|| {
        let base = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false);
        if config.json_format {
            base.json().boxed()
        } else {
            base.boxed()
        }
    });

    let file_layer = match config.file.as_deref() {
        Some(file) if !file_logging_disabled() => {
            let appender = rolling::Builder::new()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix("solarizer")
                .filename_suffix("log")
                .max_log_files(config.backup_count.max(1) as usize)
                .build(log_directory(file))
                .map_err(|e| {
                    SolarizerError::io(format!("Failed to create log file appender: {}", e))
                })?;
            let (writer, guard) = non_blocking(appender);
            let _ = LOG_GUARD.set(guard);

            let base = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false);
            Some(if config.json_format {
                base.json().boxed()
            } else {
                base.boxed()
            })
        }
        _ => None,
    };

    let has_file = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SolarizerError::config(format!("Failed to install subscriber: {}", e)))?;

    info!(
        "Logging initialized - level: {:?}, console: {}, file: {}",
        level,
        config.console_output,
        if has_file {
            config.file.as_deref().unwrap_or("-")
        } else {
            "-"
        }
    );
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("solarizer={},tower_http=info,warn", level).into())
}

fn file_logging_disabled() -> bool {
    cfg!(test) || std::env::var_os("SOLARIZER_DISABLE_FILE_LOG").is_some()
}

// A path with an extension names a file; its parent directory holds the rotation
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}
