//! Tracing subscriber setup for the engine crates and the `cutline` binary.
//!
//! Events go to stderr, or to `LoggingConfig::file` when set, so stdout
//! stays free for command output.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable that overrides the configured filter. `RUST_LOG`
/// is consulted after it.
pub const LOG_ENV: &str = "CUTLINE_LOG";

/// Targets a bare level applies to. Everything else logs at `warn`.
const ENGINE_TARGETS: &[&str] = &[
    "cutline",
    "cutline_common",
    "cutline_project_model",
    "cutline_processing_core",
    "cutline_media_cache",
    "cutline_render_engine",
];

/// Filter directives for a configured level.
///
/// A bare level such as `debug` is scoped to the engine crates. Anything
/// naming a target or listing several directives is used as written.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .chain(std::iter::once("warn".to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.level)));

    let mut file_error = None;
    let (writer, to_file) = match config.file.as_deref().map(open_log_file) {
        Some(Ok(file)) => (BoxMakeWriter::new(Mutex::new(file)), true),
        Some(Err(e)) => {
            file_error = Some(e);
            (BoxMakeWriter::new(std::io::stderr), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), false),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(
            builder
                .with_ansi(!to_file)
                .with_target(config.with_target)
                .finish(),
        )
    };
    if installed.is_err() {
        return;
    }

    if let (Some(path), Some(error)) = (&config.file, file_error) {
        tracing::warn!(path = %path.display(), %error, "Cannot open log file, logging to stderr");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
