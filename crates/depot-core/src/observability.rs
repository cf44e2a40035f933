//! Logging setup shared by every process role.
//!
//! Console output always; a daily-rolling file as well when a log
//! directory is configured. `RUST_LOG` overrides the configured level.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("cannot create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Keeps the file writer flushing. Hold it until the process exits.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_env_filter(env.as_deref(), &config.level)?;

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// A non-empty `RUST_LOG` wins over the configured level.
fn build_env_filter(env: Option<&str>, level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = env.filter(|d| !d.trim().is_empty()).unwrap_or(level);
    EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}
