//! Upload error types.

use std::path::PathBuf;

/// Errors that end an upload session.
///
/// Progress-record problems are not listed here: they are recovered or
/// logged inside the session and never surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("fail to read file {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid block size {0}, must be positive")]
    InvalidBlockSize(u64),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("cancelled")]
    Cancelled,

    #[error("an upload for this file is already running ({0})")]
    SessionBusy(String),

    #[error("session already started")]
    AlreadyStarted,
}

impl UploadError {
    /// Whether this is the user-requested abort rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
