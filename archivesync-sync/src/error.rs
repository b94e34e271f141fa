//! Sync error types.

use archivesync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing with the message archive.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server offers no message archive. Callers short-circuit silently.
    #[error("message archive not supported")]
    Unsupported,

    #[error("account not authenticated")]
    NotAuthenticated,

    #[error("archive query timed out")]
    NetworkTimeout,

    #[error("archive rejected query: {0}")]
    Protocol(String),

    #[error("archive query interrupted")]
    Interrupted,

    #[error("undecodable archive entry {entry}: {reason}")]
    DecodeFailure { entry: usize, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True for failures raised by the archive query layer.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            SyncError::NotAuthenticated
                | SyncError::NetworkTimeout
                | SyncError::Protocol(_)
                | SyncError::Interrupted
        )
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, SyncError::Unsupported)
    }
}
