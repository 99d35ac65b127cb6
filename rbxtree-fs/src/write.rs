//! File write primitives.
//!
//! ## `write_atomic`
//!
//! 1. Ensure the parent directory exists.
//! 2. Write to `<path>.rbxtree.tmp`.
//! 3. Rename to the final path (atomic on POSIX).
//! 4. On rename failure remove the `.tmp` and leave the original intact.
//!
//! ## `write_new`
//!
//! Creates a file only if nothing exists at the path yet.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, TreeError};

/// Outcome of [`write_new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { path: PathBuf },
    /// Something already exists at the path; it was left untouched.
    SkippedExisting { path: PathBuf },
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.rbxtree.tmp", path.display()))
}

/// Replace `path` with `content` via a `.tmp` sibling and a rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), TreeError> {
    write_atomic_with_tmp(path, content, &tmp_path(path))
}

fn write_atomic_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<(), TreeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    tracing::debug!("wrote: {}", path.display());
    Ok(())
}

/// Create `path` with `content`, never replacing an existing entry.
pub fn write_new(path: &Path, content: &[u8]) -> Result<WriteOutcome, TreeError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::warn!("exists, not overwriting: {}", path.display());
            return Ok(WriteOutcome::SkippedExisting {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(io_err(path, e)),
    };
    file.write_all(content).map_err(|e| io_err(path, e))?;
    tracing::debug!("wrote: {}", path.display());
    Ok(WriteOutcome::Written {
        path: path.to_path_buf(),
    })
}
