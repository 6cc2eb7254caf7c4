/// Fixed block size: 4 MiB.
///
/// The remote service keys continuation contexts by block, so this value
/// must match what produced any record being resumed.
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Size of a single request inside a block (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// File extension of persisted progress records.
pub const RECORD_EXTENSION: &str = "progress";

/// Default progress directory, relative to the working directory.
pub const PROGRESS_DIR_NAME: &str = "progress";

/// A context is treated as expired this long before its `expired_at`.
pub const CONTEXT_EXPIRY_MARGIN_SECS: i64 = 24 * 60 * 60;
