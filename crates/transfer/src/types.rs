use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A chunk of data destined for an exact offset in a target file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the target file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// Relative path of the target file.
    pub file_path: String,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
    /// CRC-32 of `data`.
    pub crc32: u32,
}

/// Source file as observed when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, nanoseconds since the Unix epoch.
    pub modified: i128,
}

impl FileDescriptor {
    /// Reads size and modification time of `path`.
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let modified = match meta.modified()?.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i128,
            Err(e) => -(e.duration().as_nanos() as i128),
        };
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified,
        })
    }
}
