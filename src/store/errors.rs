//! Store error types
//!
//! One error enum for the whole subsystem. The variants mirror the failure
//! classes a caller can act on:
//!
//! - `NotFound` is separated from other I/O failures so callers can compose
//!   open-or-create without string matching
//! - `Mutator` passes the caller's own mutation failure through unchanged
//! - `Io` names the failing step in its context message and keeps the
//!   underlying `io::Error` as `source()`

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by [`Store`](super::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file does not exist (open only).
    #[error("state file not found: {path}")]
    NotFound {
        /// Path that was opened
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: io::Error,
    },

    /// The backing file exists but its contents do not decode as the stored type.
    #[error("failed to decode state file {path}")]
    Decode {
        /// Path that was decoded
        path: PathBuf,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory value failed to serialize.
    #[error("failed to encode state")]
    Encode {
        /// Underlying encode error
        #[source]
        source: serde_json::Error,
    },

    /// A filesystem operation failed. The context names the failing step.
    #[error("{context}")]
    Io {
        /// What was being attempted, and on which path
        context: String,
        /// Underlying filesystem error
        #[source]
        source: io::Error,
    },

    /// The caller's mutator signaled failure; nothing was committed.
    #[error(transparent)]
    Mutator(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    /// Create a not-found error for the given path.
    pub(crate) fn not_found(path: &Path, source: io::Error) -> Self {
        Self::NotFound {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a decode error for the given path.
    pub(crate) fn decode(path: &Path, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create an encode error.
    pub(crate) fn encode(source: serde_json::Error) -> Self {
        Self::Encode { source }
    }

    /// Create an I/O error with step context.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns whether this error is "file not found".
    ///
    /// Lets callers fall back to [`Store::create`](super::Store::create) when
    /// attaching to state that does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        let err = StoreError::not_found(
            Path::new("/data/state.json"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.is_not_found());

        let err = StoreError::io(
            "failed to read state file /data/state.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_display_names_path() {
        let err = StoreError::not_found(
            Path::new("/data/state.json"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        let display = format!("{}", err);
        assert!(display.contains("/data/state.json"));
        assert!(display.contains("not found"));
    }

    #[test]
    fn test_io_display_is_context() {
        let err = StoreError::io(
            "failed to sync temp file /data/state.json.tmp",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(
            format!("{}", err),
            "failed to sync temp file /data/state.json.tmp"
        );
    }

    #[test]
    fn test_mutator_display_is_transparent() {
        let inner = io::Error::new(io::ErrorKind::InvalidInput, "balance went negative");
        let err = StoreError::Mutator(Box::new(inner));
        assert_eq!(format!("{}", err), "balance went negative");
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error;

        let err = StoreError::io(
            "failed to create temp file",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let source = err.source().expect("io error must carry a source");
        let io_err = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
