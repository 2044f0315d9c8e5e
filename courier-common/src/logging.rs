use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer,
    filter::FilterFn,
    fmt::{time::ChronoUtc, writer::BoxMakeWriter},
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

use crate::LoggingError;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Events about traffic leaving us, i.e. channel sends
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

/// Events about traffic arriving, i.e. API requests
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::incoming!(level = TRACE, $($msg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Output format of the log sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration
///
/// With no `file`, events go to stdout with ANSI colours. With a `file`, events
/// are appended to it without colours.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level (`trace`, `debug`, `info`, `warn`, `error`, `off`).
    ///
    /// The `LOG_LEVEL` environment variable takes precedence.
    #[serde(default)]
    pub level: Option<String>,

    /// Append events to this file instead of stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Pick the level filter: environment first, then configuration, then the
/// build default. Unparseable values fall through to the next source.
fn resolve_level(configured: Option<&str>, environment: Option<&str>) -> LevelFilter {
    let default = default_level();

    [environment, configured]
        .into_iter()
        .flatten()
        .find_map(|level| {
            LevelFilter::from_str(level)
                .inspect_err(|_| {
                    eprintln!("Invalid log level specified {level}, ignoring");
                })
                .ok()
        })
        .unwrap_or(default)
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns an error if the log file cannot be opened, or if a global
/// subscriber has already been installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let environment = std::env::var("LOG_LEVEL").ok();
    let level = resolve_level(config.level.as_deref(), environment.as_deref());

    let (writer, ansi) = match &config.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(ansi)
        .with_timer(ChronoUtc::rfc_3339());

    let layer = match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::Registry::default()
        .with(
            layer
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("courier")
                })),
        )
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
