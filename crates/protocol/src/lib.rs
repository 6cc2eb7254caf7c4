pub mod constants;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{BLOCK_SIZE, CONTEXT_EXPIRY_MARGIN_SECS, DEFAULT_CHUNK_SIZE};
pub use types::{
    BlockResult, PartialUpload, ProgressEvent, ProgressRecord, PutRet, SessionState, UploadResponse,
};
