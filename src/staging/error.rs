//! Error taxonomy for staged writes.
//!
//! Every error is fatal to the batch it came from. Nothing here is retried
//! internally; the caller decides whether to start a new batch.

use std::io::Error as IoError;

/// Errors returned by [`StagedWriter`](crate::staging::StagedWriter).
#[derive(Debug)]
pub enum StagingError {
    /// The batch has been committed (or is committing) and accepts no more input
    Closed,
    /// Allocating a scratch file failed
    ScratchAllocation(IoError),
    /// Appending to or finalizing a stream's scratch file failed
    ScratchWrite { key: String, source: IoError },
    /// Reopening or measuring a finalized scratch file failed
    ScratchRead { key: String, source: IoError },
    /// The object store rejected or failed the upload
    Transfer { key: String, source: IoError },
}

impl StagingError {
    /// True for the terminal `Closed` condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, StagingError::Closed)
    }

    /// Logical key the error relates to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            StagingError::ScratchWrite { key, .. }
            | StagingError::ScratchRead { key, .. }
            | StagingError::Transfer { key, .. } => Some(key),
            StagingError::Closed | StagingError::ScratchAllocation(_) => None,
        }
    }
}

impl std::fmt::Display for StagingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingError::Closed => write!(
                f,
                "writer has already closed its streams, not accepting any more input"
            ),
            StagingError::ScratchAllocation(e) => {
                write!(f, "Failed to allocate scratch file: {}", e)
            }
            StagingError::ScratchWrite { key, source } => {
                write!(f, "Scratch write failed for {}: {}", key, source)
            }
            StagingError::ScratchRead { key, source } => {
                write!(f, "Scratch read failed for {}: {}", key, source)
            }
            StagingError::Transfer { key, source } => {
                write!(f, "Upload failed for {}: {}", key, source)
            }
        }
    }
}

impl std::error::Error for StagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StagingError::Closed => None,
            StagingError::ScratchAllocation(e) => Some(e),
            StagingError::ScratchWrite { source, .. }
            | StagingError::ScratchRead { source, .. }
            | StagingError::Transfer { source, .. } => Some(source),
        }
    }
}

/// Result alias for staging operations
pub type Result<T> = std::result::Result<T, StagingError>;
