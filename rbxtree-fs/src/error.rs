//! Error types for rbxtree-fs.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a consolidate / materialize / scan run.
///
/// Per-file problems are not errors; they are collected as [`Warning`]s.
#[derive(Debug, Error)]
pub enum TreeError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error for a whole document.
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The source root to scan does not exist or is not a directory.
    #[error("source root {path} is not a directory")]
    MissingRoot { path: PathBuf },
}

/// Convenience constructor for [`TreeError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TreeError {
    TreeError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> TreeError {
    TreeError::Json {
        path: path.into(),
        source,
    }
}

/// A recoverable problem: the offending source was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// File path or batch label.
    pub source: String,
    pub message: String,
}

impl Warning {
    pub(crate) fn new(source: impl Into<String>, message: impl fmt::Display) -> Self {
        let warning = Self {
            source: source.into(),
            message: message.to_string(),
        };
        tracing::warn!("{warning}");
        warning
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
