use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type LogResult<T> = Result<T, LogError>;

/// Storage errors surfaced by the log and its components.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested offset is below the lowest or at/above the highest
    /// available offset. Not retryable; the caller must adjust the offset.
    #[error("offset {0} out of range")]
    OffsetOutOfRange(u64),

    /// The index has no room for another entry. The segment's max-size check
    /// rotates before this can happen, so hitting it indicates a bug or a
    /// misconfigured index capacity.
    #[error("index has no room for another entry")]
    IndexFull,

    /// A length prefix or index entry implies data past end-of-file.
    /// Distinct from `Io` so operators can tell logical corruption apart
    /// from disk failure.
    #[error("corrupt store {}: frame at position {position} runs past end of file", .path.display())]
    Corruption { path: PathBuf, position: u64 },

    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// Directory scan or segment reconstruction failed at open time.
    #[error("recovery of {} failed: {source}", .dir.display())]
    Recovery { dir: PathBuf, source: Box<LogError> },

    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl LogError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
