use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::plan::BlockPlan;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the CRC-32 (IEEE) of `data`.
pub fn crc32_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// BlockReader
// ---------------------------------------------------------------------------

/// Reads blocks, or chunks inside a block, from a source file.
pub struct BlockReader {
    file: std::fs::File,
    plan: BlockPlan,
    file_path: String,
}

impl BlockReader {
    /// Opens `path` and lays it out in blocks of `block_size` bytes.
    pub fn open(path: &Path, block_size: u64) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            plan: BlockPlan::new(size, block_size),
            file_path: path.to_string_lossy().into_owned(),
        })
    }

    pub fn plan(&self) -> BlockPlan {
        self.plan
    }

    /// Reads up to `max_len` bytes of block `index`, starting `offset` bytes
    /// into the block.
    ///
    /// The returned chunk's `offset` is relative to the start of the file.
    pub fn read_chunk(
        &mut self,
        index: usize,
        offset: u64,
        max_len: u64,
    ) -> Result<Chunk, TransferError> {
        if index >= self.plan.block_count() {
            return Err(TransferError::BlockOutOfRange {
                index,
                block_count: self.plan.block_count(),
            });
        }
        let block_len = self.plan.block_len(index);
        let len = std::cmp::min(max_len, block_len.saturating_sub(offset));
        let start = self.plan.block_offset(index) + offset;

        self.file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;

        let checksum = checksum_bytes(&buf);
        let crc32 = crc32_bytes(&buf);
        Ok(Chunk {
            offset: start,
            data: buf,
            file_path: self.file_path.clone(),
            checksum,
            crc32,
        })
    }

    /// Reads all of block `index`.
    pub fn read_block(&mut self, index: usize) -> Result<Chunk, TransferError> {
        let len = self.plan.block_len(index);
        self.read_chunk(index, 0, len)
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes chunks to disk at exact offsets with optional checksum verification.
pub struct ChunkWriter {
    base_path: PathBuf,
}

impl ChunkWriter {
    /// Creates a writer rooted at `base_path`.
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
        }
    }

    /// Writes a chunk and returns the offset just past it.
    ///
    /// - Rejects paths escaping `base_path`.
    /// - Verifies checksum if non-empty.
    /// - Creates intermediate directories as needed.
    pub fn write_chunk(&self, chunk: &Chunk) -> Result<u64, TransferError> {
        crate::validate_object_key(&chunk.file_path)?;

        if !chunk.checksum.is_empty() && checksum_bytes(&chunk.data) != chunk.checksum {
            return Err(TransferError::ChecksumMismatch);
        }

        let full_path = self.base_path.join(&chunk.file_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&full_path)?;
        file.seek(SeekFrom::Start(chunk.offset))?;
        file.write_all(&chunk.data)?;

        Ok(chunk.offset + chunk.data.len() as u64)
    }

    /// Returns the base output path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
