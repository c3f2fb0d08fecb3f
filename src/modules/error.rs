//! Error kinds surfaced by the filesystem core.

use libc::{c_int, EIO, EISDIR, ENOENT};
use std::io;
use thiserror::Error;

/// Every failure a filesystem operation can report.
///
/// The FUSE adapter turns these into errno values with [`FsError::errno`].
#[derive(Debug, Error)]
pub enum FsError {
    /// A path segment ends in an escape marker with nothing left to unescape.
    #[error("malformed escape sequence in {0:?}")]
    MalformedEscape(String),

    /// A path segment is empty or contains a separator byte.
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),

    /// No node carries this inode number.
    #[error("unknown inode {0}")]
    UnknownNode(u64),

    /// No live session is bound to this file handle.
    #[error("unknown file handle {0}")]
    UnknownHandle(u64),

    /// Only the terminal entry can be opened as a file.
    #[error("inode {0} is not a terminal entry")]
    NotTerminal(u64),

    /// The subprocess could not be created.
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        /// Reconstructed command text
        command: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to a session pipe failed.
    #[error("stream error on handle {handle}: {source}")]
    Stream {
        /// File handle the stream belongs to
        handle: u64,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Maps the error onto the errno reported to the filesystem client.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::MalformedEscape(_)
            | FsError::InvalidSegment(_)
            | FsError::UnknownNode(_)
            | FsError::UnknownHandle(_) => ENOENT,
            FsError::NotTerminal(_) => EISDIR,
            FsError::Spawn { .. } | FsError::Stream { .. } => EIO,
        }
    }
}

/// Result alias for filesystem core operations.
pub type FsResult<T> = std::result::Result<T, FsError>;
