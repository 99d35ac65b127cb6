//! Error types for rbxtree-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading a [`crate::config::SyncConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value parsed but is unusable (e.g. a zero batch size).
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Why a filesystem entry does not map to an instance path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{path} is not inside source root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("{path} is not a metadata or source file")]
    Unrecognized { path: PathBuf },

    #[error("{path} has a non UTF-8 component")]
    NonUtf8 { path: PathBuf },

    /// `_meta.rbxjson` placed directly in the source root has no instance.
    #[error("{path} does not name an instance")]
    Empty { path: PathBuf },
}
