//! Error taxonomy for the save-file pipeline.
//!
//! Only I/O failures surface as errors; malformed content inside a
//! readable file is skipped per record and logged at debug level.
//! Transient errors (a writer still holding the file lock) are
//! retryable, anything else aborts processing of that file.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    /// The file is locked or mid-write; worth retrying shortly.
    #[error("file busy: {path:?}: {source}")]
    Transient {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied, path vanished, etc. Not retried.
    #[error("io error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No registered reader accepts this file.
    #[error("no reader for {path:?}")]
    Unsupported { path: PathBuf },
}

impl ReadError {
    /// Wrap an I/O error, classifying lock contention as transient.
    pub fn from_io(path: &std::path::Path, source: io::Error) -> Self {
        if is_transient(&source) {
            Self::Transient {
                path: path.to_path_buf(),
                source,
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Lock contention shows up differently per platform: WouldBlock-style
/// kinds on Unix, sharing violations (os errors 32/33) on Windows.
fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => true,
        _ => matches!(err.raw_os_error(), Some(32) | Some(33)) && cfg!(windows),
    }
}
