//! Partitioning of a file into fixed-size blocks.

use std::path::Path;

use crate::chunked::checksum_bytes;

/// Number of blocks for a file of `size` bytes.
///
/// Ceiling division; an empty file still has one (empty) block so that
/// every upload produces at least one completion.
pub fn block_count(size: u64, block_size: u64) -> usize {
    assert!(block_size > 0, "block size must be positive");
    if size == 0 {
        return 1;
    }
    size.div_ceil(block_size) as usize
}

/// Identifier of the progress record for one (key, path, mtime) triple.
///
/// SHA-256 over `"{key}:{path}:{mtime}"`, hex-encoded.
pub fn fingerprint(logical_key: &str, file_path: &Path, modified: i128) -> String {
    let data = format!("{logical_key}:{}:{modified}", file_path.display());
    checksum_bytes(data.as_bytes())
}

/// Block layout of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    size: u64,
    block_size: u64,
    block_count: usize,
}

impl BlockPlan {
    pub fn new(size: u64, block_size: u64) -> Self {
        Self {
            size,
            block_size,
            block_count: block_count(size, block_size),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Byte offset of block `index` within the file.
    pub fn block_offset(&self, index: usize) -> u64 {
        index as u64 * self.block_size
    }

    /// Length of block `index`; only the last block may be short.
    pub fn block_len(&self, index: usize) -> u64 {
        if index >= self.block_count {
            return 0;
        }
        let start = self.block_offset(index);
        std::cmp::min(self.block_size, self.size.saturating_sub(start))
    }

    /// Whether `offset` acknowledged bytes cover all of block `index`.
    pub fn is_block_complete(&self, index: usize, offset: u64) -> bool {
        index < self.block_count && offset == self.block_len(index)
    }
}
