//! Cache key derivation.
//!
//! Open documents are keyed by their editor version; closed files by
//! `(mtime_seconds, size_bytes)` from a filesystem stat. The size component
//! is mandatory: filesystem mtime has one-second resolution, so two writes
//! within the same second are only distinguishable by length.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Identity of a cached compilation for one path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Open document, keyed by the editor-assigned version.
    Editor {
        /// Monotonic document version from the editor
        version: i32,
    },
    /// Closed file, keyed by filesystem metadata.
    Disk {
        /// Modification time in whole seconds since the epoch
        mtime: i64,
        /// File size in bytes
        size: u64,
    },
}

impl CacheKey {
    /// Key for an open document at the given version.
    pub fn editor(version: i32) -> Self {
        CacheKey::Editor { version }
    }

    /// Key for a closed file, from a filesystem stat.
    ///
    /// Fails with the underlying I/O error when the file cannot be statted;
    /// callers treat `NotFound` as "file removed" and invalidate.
    pub fn disk(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(CacheKey::Disk { mtime, size: meta.len() })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Editor { version } => write!(f, "LSP:{}", version),
            // NUL keeps mtime and size unambiguous in the joined form.
            CacheKey::Disk { mtime, size } => write!(f, "FS:{}\0{}", mtime, size),
        }
    }
}
