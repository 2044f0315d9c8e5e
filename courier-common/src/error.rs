//! Error types for the courier-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured log file could not be opened for appending.
    #[error("Failed to open log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber has already been installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}
