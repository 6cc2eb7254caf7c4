use blockput_transfer::TransferError;
use blockput_uploader::UploadError;

/// Errors raised by the local bucket.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("invalid upload token")]
    Unauthorized,

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("block {0} was never uploaded")]
    MissingBlock(usize),

    #[error("block {index} is short: expected {expected} bytes, staged {actual}")]
    ShortBlock {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("injected fault: {0}")]
    Injected(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<BucketError> for UploadError {
    fn from(e: BucketError) -> Self {
        match e {
            BucketError::Cancelled => UploadError::Cancelled,
            other => UploadError::Transfer(other.to_string()),
        }
    }
}
