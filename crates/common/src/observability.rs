//! Logging bootstrap.
//!
//! Installs a JSON `tracing-subscriber` formatter. `RUST_LOG` takes
//! precedence over the level passed in by the caller. Output starts on
//! stdout so that events emitted while the configuration is loaded are not
//! lost; once the configuration names a log file, [`LogHandle`] moves the
//! output there.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type JsonLayer = fmt::Layer<Registry, JsonFields, Format<Json>, BoxMakeWriter>;

/// Errors raised while installing or redirecting the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),

    #[error("failed to redirect log output: {0}")]
    Redirect(String),
}

/// Build the filter used by [`init_tracing`].
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Switches the output of the installed subscriber
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<JsonLayer, Registry>,
}

impl LogHandle {
    /// Append all further events to `path` instead of stdout
    pub fn redirect_to_file(&self, path: &Path) -> Result<(), LoggingError> {
        let file = open_log_file(path)?;
        self.handle
            .modify(|layer| *layer.writer_mut() = BoxMakeWriter::new(Mutex::new(file)))
            .map_err(|e| LoggingError::Redirect(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Log output redirected");
        Ok(())
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

fn build_subscriber(default_level: &str) -> (impl Subscriber + Send + Sync + 'static, LogHandle) {
    let layer: JsonLayer = fmt::layer()
        .json()
        .with_target(false)
        .with_writer(BoxMakeWriter::new(std::io::stdout));
    let (layer, handle) = reload::Layer::new(layer);

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(env_filter(default_level));
    (subscriber, LogHandle { handle })
}

/// Install the global JSON subscriber writing to stdout.
pub fn init_tracing(default_level: &str) -> Result<LogHandle, LoggingError> {
    let (subscriber, handle) = build_subscriber(default_level);
    subscriber
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;
    Ok(handle)
}

fn open_log_file(path: &Path) -> Result<fs::File, LoggingError> {
    let to_error = |source| LoggingError::LogFile {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_error)
}
