//! Block planning, resumable progress records and progress notification.
//!
//! Everything in this crate is transport-agnostic: the session logic that
//! drives a remote service lives in `blockput-uploader`.

mod chunked;
mod plan;
mod progress;
mod store;
mod types;
mod validation;

pub use chunked::{
    BlockReader, ChunkWriter, calculate_file_checksum, checksum_bytes, crc32_bytes,
};
pub use plan::{BlockPlan, block_count, fingerprint};
pub use progress::{ProgressNotifier, ProgressStream};
pub use store::{ProgressStore, RecordLease};
pub use types::{Chunk, FileDescriptor};
pub use validation::validate_object_key;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("block {index} out of range (block count {block_count})")]
    BlockOutOfRange { index: usize, block_count: usize },

    #[error("progress record busy: {0}")]
    RecordBusy(String),

    #[error("progress record not open: {0}")]
    RecordNotOpen(String),
}
