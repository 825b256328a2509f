//! Tracing setup for eraflow.
//!
//! Records go to stderr so they never interleave with game text on stdout.
//! `RUST_LOG` wins over the configured level when it is set.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{EraError, Result};

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Directives used when `RUST_LOG` is absent: this crate at `level`,
/// dependencies at warn.
fn default_directives(level: &str) -> String {
    let level = parse_level(level).to_string().to_lowercase();
    format!("warn,eraflow={level}")
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber described by `config`.
///
/// With a non-empty `config.file` every record is also appended to that
/// file, creating its directory first. Fails if a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.file.is_empty() {
        return init_stderr(&config.level);
    }

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;
    let writer = std::io::stderr.and(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .with(build_filter(&config.level))
        .try_init()
        .map_err(|e| EraError::Config(format!("logging already initialized: {e}")))
}

fn init_stderr(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(build_filter(level))
        .try_init()
        .map_err(|e| EraError::Config(format!("logging already initialized: {e}")))
}

/// Console-only logging. Does nothing if a subscriber is already installed.
pub fn init_console_only(level: &str) {
    let _ = init_stderr(level);
}
