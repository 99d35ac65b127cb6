//! Error types for rbxtree-sync.

use std::path::PathBuf;

use thiserror::Error;

use rbxtree_core::ConfigError;
use rbxtree_fs::TreeError;

/// Errors that abort a sync before any operation is sent.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The health check failed; nothing was sent.
    #[error("cannot reach sync server at {url}: {reason}")]
    HostUnreachable { url: String, reason: String },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// A single-file sync target with no `src` directory above it.
    #[error("no `src` directory above {path}")]
    NoSourceRoot { path: PathBuf },

    /// A single-file sync target that is neither metadata nor source.
    #[error("not a metadata or source file: {path}")]
    NotSyncable { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
