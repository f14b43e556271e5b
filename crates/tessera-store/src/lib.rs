//! # tessera-store
//!
//! Hierarchical file store abstraction used by the staged output protocol.
//!
//! The protocol only needs a handful of primitives from storage: listing,
//! block placement, streams, and an atomic `rename`. [`FileStore`] names them;
//! [`LocalStore`] implements them on the local filesystem.
//!
//! ## Layout
//!
//! ```text
//! FileStore (trait, object-safe)
//! ├── LocalStore          std::fs + walkdir
//! └── (tests)             fault-injecting wrappers
//!
//! Counter ── ByteCounter / NoopCounter        progress sink
//! CancelToken                                 cooperative cancellation
//! CountingReader / CountingWriter             byte accounting + cancel checks
//! ```

mod counter;
mod local;
mod stream;

pub use counter::{ByteCounter, CancelToken, Counter, NoopCounter};
pub use local::LocalStore;
pub use stream::{open_range, CountingReader, CountingWriter};

use std::io::{self, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tessera_config::ErrorKind;
use tessera_fragment::BlockInfo;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to rename {from} to {to}")]
    RenameFailed { from: PathBuf, to: PathBuf },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(_) | StoreError::NotFound { .. } | StoreError::RenameFailed { .. } => {
                ErrorKind::Io
            }
            StoreError::InvalidArgument(_) => ErrorKind::Validation,
            StoreError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn cancelled_io() -> io::Error {
        io::Error::other(StoreError::Cancelled)
    }
}

/// Streams report cancellation through `io::Error`; unwrap it back here so
/// callers see `Cancelled` instead of a generic I/O failure.
impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        let cancelled = e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<StoreError>())
            .is_some_and(|inner| matches!(inner, StoreError::Cancelled));
        if cancelled {
            StoreError::Cancelled
        } else {
            StoreError::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata of one file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    pub len: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

/// Hierarchical storage backend.
///
/// Paths are absolute store paths. `rename` must be atomic per file; it is
/// the only primitive the output protocol relies on for visibility.
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Entries below `path` sorted by path, excluding `path` itself.
    ///
    /// A file lists as itself. A missing path lists as empty.
    fn list(&self, path: &Path, recursive: bool) -> Result<Vec<FileStatus>>;

    /// Status of `path`, or None if it does not exist
    fn status(&self, path: &Path) -> Result<Option<FileStatus>>;

    /// Block placement of the byte `range` of a file
    fn block_placement(&self, path: &Path, range: Range<u64>) -> Result<Vec<BlockInfo>>;

    /// Create or truncate a file, creating parent directories
    fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    /// Create a file that must not exist yet
    fn create_new(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    /// Open a file positioned at `offset`
    fn open(&self, path: &Path, offset: u64) -> Result<Box<dyn Read + Send>>;

    /// Rename a file, replacing an existing destination file.
    ///
    /// Returns false if the source does not exist.
    fn rename(&self, from: &Path, to: &Path) -> Result<bool>;

    /// Delete a file or directory. Returns false if nothing was there.
    fn delete(&self, path: &Path, recursive: bool) -> Result<bool>;

    /// Create a directory and its parents
    fn mkdirs(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.status(path)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_survives_io_roundtrip() {
        let err = StoreError::from(StoreError::cancelled_io());
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_plain_io_stays_io() {
        let err = StoreError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StoreError::InvalidArgument("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StoreError::RenameFailed {
                from: "a".into(),
                to: "b".into()
            }
            .kind(),
            ErrorKind::Io
        );
    }
}
